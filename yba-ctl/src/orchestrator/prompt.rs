// Operator confirmation

use std::io::{BufRead, Write};

pub trait Confirmer: Send + Sync {
    /// Ask a yes/no question. `default_yes` is the answer for an empty reply.
    fn confirm(&self, question: &str, default_yes: bool) -> bool;
}

/// Interpret a reply; `None` for anything that is not a yes/no answer.
pub fn parse_answer(input: &str, default_yes: bool) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "" => Some(default_yes),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Prompts on stdout and reads stdin. `force` answers yes without asking.
pub struct StdinConfirmer {
    pub force: bool,
}

const MAX_ATTEMPTS: usize = 3;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, question: &str, default_yes: bool) -> bool {
        if self.force {
            log::info!("[PHASE: initialization] [STEP: confirm] {} (yes, --force)", question);
            return true;
        }
        let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
        let stdin = std::io::stdin();
        for _ in 0..MAX_ATTEMPTS {
            print!("{} {}: ", question, hint);
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                // EOF: nobody to ask.
                Ok(0) | Err(_) => return false,
                Ok(_) => {}
            }
            if let Some(answer) = parse_answer(&line, default_yes) {
                return answer;
            }
            println!("Please answer y or n.");
        }
        false
    }
}
