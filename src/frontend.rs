//! Interaction contract between the engine and whatever draws the UI.

use std::path::Path;

pub trait Frontend {
    /// Ask a yes/no question.
    fn confirm(&mut self, message: &str) -> bool;

    /// Ask for a line of text; `None` when cancelled.
    fn input_text(&mut self, title: &str, initial: &str) -> Option<String>;

    /// Called after each item of a long operation.
    fn progress(&mut self, done: usize, total: usize, label: &str);

    /// Final outcome of an operation.
    fn message(&mut self, text: &str);

    /// Let the user edit a decrypted file in place. Returns true if changed.
    fn hex_edit(&mut self, _file: &Path) -> bool {
        false
    }

    /// Block until the user stops a running server.
    fn wait_for_stop(&mut self, message: &str) {
        self.message(message);
    }
}

#[cfg(test)]
pub mod mock {
    use super::Frontend;
    use std::collections::VecDeque;
    use std::path::Path;

    /// Scripted front end recording everything shown to the user.
    #[derive(Default)]
    pub struct ScriptedFrontend {
        pub answers: VecDeque<bool>,
        pub inputs: VecDeque<Option<String>>,
        pub messages: Vec<String>,
        pub progress: Vec<(usize, usize, String)>,
        pub edits: Vec<std::path::PathBuf>,
        pub edit_with: Option<fn(&Path)>,
    }

    impl ScriptedFrontend {
        pub fn answering(answers: &[bool]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                ..Default::default()
            }
        }

        pub fn typing(text: &str) -> Self {
            Self {
                inputs: VecDeque::from([Some(text.to_string())]),
                ..Default::default()
            }
        }

        pub fn last_message(&self) -> &str {
            self.messages.last().map(String::as_str).unwrap_or("")
        }
    }

    impl Frontend for ScriptedFrontend {
        fn confirm(&mut self, message: &str) -> bool {
            self.messages.push(message.to_string());
            self.answers.pop_front().unwrap_or(false)
        }

        fn input_text(&mut self, _title: &str, _initial: &str) -> Option<String> {
            self.inputs.pop_front().flatten()
        }

        fn progress(&mut self, done: usize, total: usize, label: &str) {
            self.progress.push((done, total, label.to_string()));
        }

        fn message(&mut self, text: &str) {
            self.messages.push(text.to_string());
        }

        fn hex_edit(&mut self, file: &Path) -> bool {
            self.edits.push(file.to_path_buf());
            match self.edit_with {
                Some(edit) => {
                    edit(file);
                    true
                }
                None => false,
            }
        }

        fn wait_for_stop(&mut self, message: &str) {
            self.messages.push(message.to_string());
        }
    }
}
