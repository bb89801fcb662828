use anyhow::Context;
use inquire::{Password as PasswordPrompt, PasswordDisplayMode, Text};
use tlc_attendance_utils::credentials::Password;

/// Source of interactive answers from the operator.
pub trait Prompter {
    /// Asks for a single setting.  `None` means the operator left the answer empty.
    fn ask(&mut self, message: &str, default: &str) -> anyhow::Result<Option<String>>;

    fn password(&mut self, message: &str) -> anyhow::Result<Password>;
}

/// Prompts on the terminal.
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn ask(&mut self, message: &str, default: &str) -> anyhow::Result<Option<String>> {
        let help = format!("Leave empty to use {default}");
        let answer = Text::new(message)
            .with_help_message(&help)
            .prompt()
            .with_context(|| format!("While asking {message:?}"))?;
        let answer = answer.trim();
        Ok((!answer.is_empty()).then(|| answer.to_owned()))
    }

    fn password(&mut self, message: &str) -> anyhow::Result<Password> {
        let password = PasswordPrompt::new(message)
            .without_confirmation()
            .with_display_mode(PasswordDisplayMode::Hidden)
            .prompt()
            .context("While asking the password")?;
        Ok(password.into())
    }
}

#[cfg(test)]
pub mod scripted {
    use std::collections::VecDeque;

    use tlc_attendance_utils::credentials::Password;

    use super::Prompter;

    /// Replays canned answers and records every question asked.
    #[derive(Default)]
    pub struct ScriptedPrompter {
        pub answers: VecDeque<Option<String>>,
        pub asked: Vec<String>,
    }

    impl ScriptedPrompter {
        pub fn new<'a>(answers: impl IntoIterator<Item = Option<&'a str>>) -> Self {
            Self {
                answers: answers.into_iter().map(|a| a.map(str::to_owned)).collect(),
                asked: vec![],
            }
        }
    }

    impl Prompter for ScriptedPrompter {
        fn ask(&mut self, message: &str, _default: &str) -> anyhow::Result<Option<String>> {
            self.asked.push(message.to_owned());
            self.answers
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("Unexpected question: {message:?}"))
        }

        fn password(&mut self, message: &str) -> anyhow::Result<Password> {
            self.asked.push(message.to_owned());
            Ok("secret".to_owned().into())
        }
    }
}
