use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Line-based terminal the shell talks to.
pub trait Terminal {
    /// Shows `prompt` and reads one line without its terminator. Returns
    /// `None` once the input is exhausted.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Writes `text` followed by a newline.
    fn write_line(&mut self, text: &str) -> io::Result<()>;
}

/// Terminal backed by the process standard input and output.
#[derive(Debug, Default)]
pub struct StdTerminal;

impl Terminal for StdTerminal {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(prompt.as_bytes())?;
        stdout.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed_len = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed_len);
        Ok(Some(line))
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        writeln!(io::stdout().lock(), "{text}")
    }
}

/// Terminal replaying a fixed list of answers and recording everything shown.
#[derive(Debug, Default)]
pub struct ScriptedTerminal {
    answers: VecDeque<String>,
    transcript: Vec<String>,
}

impl ScriptedTerminal {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }

    /// Everything written so far, prompts included, one entry per line.
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// The transcript joined into one string.
    pub fn output(&self) -> String {
        self.transcript.join("\n")
    }

    pub fn remaining_answers(&self) -> usize {
        self.answers.len()
    }
}

impl Terminal for ScriptedTerminal {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let answer = self.answers.pop_front();
        self.transcript
            .push(format!("{prompt}{}", answer.as_deref().unwrap_or_default()));
        Ok(answer)
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.transcript.push(text.to_string());
        Ok(())
    }
}
