use crate::scheduler::EntityKind;

/// Separates a verb from its single argument.
pub const DELIMITER: char = ':';

/// Operations addressed to one job or report, e.g. `jobrun:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityVerb {
    StartStatus,
    CanStart,
    StartTime,
    RunTime,
    ExitCode,
    Dependencies,
    Finished,
    Json,
    Reset,
    Remove,
    Add,
    Run,
}

impl EntityVerb {
    pub const ALL: [EntityVerb; 12] = [
        EntityVerb::StartStatus,
        EntityVerb::CanStart,
        EntityVerb::StartTime,
        EntityVerb::RunTime,
        EntityVerb::ExitCode,
        EntityVerb::Dependencies,
        EntityVerb::Finished,
        EntityVerb::Json,
        EntityVerb::Reset,
        EntityVerb::Remove,
        EntityVerb::Add,
        EntityVerb::Run,
    ];

    fn suffix(self) -> &'static str {
        match self {
            EntityVerb::StartStatus => "startstatus",
            EntityVerb::CanStart => "canstart",
            EntityVerb::StartTime => "starttime",
            EntityVerb::RunTime => "runtime",
            EntityVerb::ExitCode => "exitcode",
            EntityVerb::Dependencies => "dependencies",
            EntityVerb::Finished => "finished",
            EntityVerb::Json => "json",
            EntityVerb::Reset => "reset",
            EntityVerb::Remove => "remove",
            EntityVerb::Add => "add",
            EntityVerb::Run => "run",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Uptime,
    ProcessId,
    Hello,
    Exit,
    Entity(EntityKind, EntityVerb),
    List(EntityKind),
    Count(EntityKind),
    Reload(EntityKind),
    ResetAll(EntityKind),
    NextJob,
    ListGroupReports,
    ReportGroupRun,
}

const KINDS: [EntityKind; 2] = [EntityKind::Job, EntityKind::Report];

impl Verb {
    /// Every verb, `exit` included.
    pub fn all() -> Vec<Verb> {
        let mut verbs = vec![Verb::Uptime, Verb::ProcessId, Verb::Hello, Verb::Exit];
        for kind in KINDS {
            verbs.extend(EntityVerb::ALL.iter().map(|v| Verb::Entity(kind, *v)));
            verbs.push(Verb::List(kind));
            verbs.push(Verb::Count(kind));
            verbs.push(Verb::Reload(kind));
            verbs.push(Verb::ResetAll(kind));
        }
        verbs.extend([Verb::NextJob, Verb::ListGroupReports, Verb::ReportGroupRun]);
        verbs
    }

    pub fn name(&self) -> String {
        match self {
            Verb::Uptime => "uptime".to_string(),
            Verb::ProcessId => "processid".to_string(),
            Verb::Hello => "hello".to_string(),
            Verb::Exit => "exit".to_string(),
            Verb::Entity(kind, verb) => format!("{}{}", kind, verb.suffix()),
            Verb::List(kind) => format!("list{}s", kind),
            Verb::Count(kind) => format!("numberof{}s", kind),
            Verb::Reload(kind) => format!("reload{}s", kind),
            Verb::ResetAll(kind) => format!("reset{}s", kind),
            Verb::NextJob => "nextjob".to_string(),
            Verb::ListGroupReports => "listgroupreports".to_string(),
            Verb::ReportGroupRun => "reportgrouprun".to_string(),
        }
    }

    pub fn parse(name: &str) -> Option<Verb> {
        Verb::all().into_iter().find(|verb| verb.name() == name)
    }
}

/// Names of all verbs a client may send, `exit` excluded.
pub fn catalogue() -> Vec<String> {
    Verb::all()
        .into_iter()
        .filter(|verb| *verb != Verb::Exit)
        .map(|verb| verb.name())
        .collect()
}

/// Whether `message`'s verb is in the catalogue.
pub fn is_known_message(message: &str) -> bool {
    let verb = message.split(DELIMITER).next().unwrap_or_default().trim();
    !verb.is_empty() && catalogue().iter().any(|known| known == verb)
}

/// A parsed request: `<verb>` or `<verb>:<argument>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub verb: Verb,
    pub argument: Option<String>,
}

impl Command {
    pub fn new(verb: Verb, argument: Option<String>) -> Self {
        Self { verb, argument }
    }

    /// Parse a request line. Returns `None` for unknown verbs.
    pub fn parse(message: &str) -> Option<Command> {
        let (verb, argument) = match message.split_once(DELIMITER) {
            Some((verb, argument)) => (verb, Some(argument)),
            None => (message, None),
        };
        let verb = Verb::parse(verb.trim())?;
        let argument = argument
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        Some(Command { verb, argument })
    }

    pub fn to_message(&self) -> String {
        match &self.argument {
            Some(argument) => format!("{}{}{}", self.verb.name(), DELIMITER, argument),
            None => self.verb.name(),
        }
    }
}
