//! Terminal implementation of the core's prompting seam.

use std::io::{BufRead, Write};

use xcresolve_core::{Error, Prompter};

/// Prompts on stderr and reads answers from stdin, so stdout stays clean
/// for machine-readable output.
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn read_line(&self) -> Result<String, Error> {
        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|err| Error::Prompt(err.to_string()))?;
        if read == 0 {
            return Err(Error::Prompt("stdin closed".to_string()));
        }
        Ok(line.trim().to_string())
    }
}

impl Prompter for TerminalPrompter {
    fn choose(&self, message: &str, options: &[String]) -> Result<String, Error> {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{message}");
        for (index, option) in options.iter().enumerate() {
            let _ = writeln!(stderr, "  {}. {option}", index + 1);
        }
        drop(stderr);

        loop {
            let answer = self.read_line()?;
            // Accept a 1-based index or the literal option text.
            if let Ok(index) = answer.parse::<usize>() {
                if index >= 1 && index <= options.len() {
                    return Ok(options[index - 1].clone());
                }
            }
            if let Some(exact) = options.iter().find(|option| **option == answer) {
                return Ok(exact.clone());
            }
            let _ = writeln!(
                std::io::stderr(),
                "Please answer with a number between 1 and {}",
                options.len()
            );
        }
    }

    fn input(&self, message: &str) -> Result<String, Error> {
        let _ = writeln!(std::io::stderr(), "{message}");
        self.read_line()
    }
}
