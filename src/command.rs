// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    ListModels,
    SelectModel(String),
    Memory(usize),
    ClearMemory,
    Forget(String),
    History(usize),
    Stats,
    Help,
    Quit,
    Unknown(String),
}

pub const DEFAULT_MEMORY_LIMIT: usize = 5;
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

pub const HELP: &str = "\
/models          list available models
/model <name>    switch model
/memory [n]      show the n most recent cached answers
/memory clear    delete every cached answer
/forget <prompt> delete the cached answer for one prompt
/history [n]     show the last n transcript lines
/stats           show counters
/quit            exit";

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Command::Prompt(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "models" => Command::ListModels,
            "model" if !arg.is_empty() => Command::SelectModel(arg.to_string()),
            "memory" if arg.is_empty() => Command::Memory(DEFAULT_MEMORY_LIMIT),
            "memory" if arg == "clear" => Command::ClearMemory,
            "memory" => match arg.parse() {
                Ok(n) => Command::Memory(n),
                Err(_) => Command::Unknown(trimmed.to_string()),
            },
            "forget" if !arg.is_empty() => Command::Forget(arg.to_string()),
            "history" if arg.is_empty() => Command::History(DEFAULT_HISTORY_LIMIT),
            "history" => match arg.parse() {
                Ok(n) => Command::History(n),
                Err(_) => Command::Unknown(trimmed.to_string()),
            },
            "stats" => Command::Stats,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => Command::Unknown(trimmed.to_string()),
        }
    }
}
