//! Apply one operation to many saves, counting successes and failures.

use crate::error::SaveResult;
use crate::frontend::Frontend;
use crate::saves::SaveEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    Selected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkTally {
    pub done: usize,
    pub failed: usize,
}

impl BulkTally {
    pub fn total(&self) -> usize {
        self.done + self.failed
    }

    pub fn summary(&self, verb: &str) -> String {
        if self.failed == 0 {
            format!("{} {}/{} saves", verb, self.done, self.total())
        } else {
            format!("{} {}/{} saves ({} failed)", verb, self.done, self.total(), self.failed)
        }
    }
}

/// Run `op` on every entry that is `eligible` and, for `Selection::Selected`,
/// marked selected. Failures are logged and counted; the run always finishes.
pub fn for_each<'a, I, P, F>(
    entries: I,
    selection: Selection,
    eligible: P,
    frontend: &mut dyn Frontend,
    mut op: F,
) -> BulkTally
where
    I: IntoIterator<Item = &'a SaveEntry>,
    P: Fn(&SaveEntry) -> bool,
    F: FnMut(&SaveEntry) -> SaveResult<()>,
{
    let targets: Vec<&SaveEntry> = entries
        .into_iter()
        .filter(|e| eligible(*e) && (selection == Selection::All || e.is_selected()))
        .collect();
    let total = targets.len();
    let mut tally = BulkTally::default();

    for entry in targets {
        match op(entry) {
            Ok(()) => tally.done += 1,
            Err(e) => {
                log::warn!("[bulk] {} failed: {}", entry.dir_name, e);
                tally.failed += 1;
            }
        }
        frontend.progress(tally.total(), total, &entry.name);
    }

    log::info!("[bulk] {} done, {} failed", tally.done, tally.failed);
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SaveError;
    use crate::frontend::mock::ScriptedFrontend;
    use crate::saves::{SaveFlags, SaveType};

    fn list(n: usize) -> Vec<SaveEntry> {
        (1..=n)
            .map(|i| {
                let mut e = SaveEntry::new(SaveType::Psp, SaveFlags::PSP, format!("Save {}", i));
                e.dir_name = format!("DIR{}", i);
                e
            })
            .collect()
    }

    #[test]
    fn test_items_three_and_seven_fail() {
        let entries = list(10);
        let mut ui = ScriptedFrontend::default();
        let tally = for_each(&entries, Selection::All, |_| true, &mut ui, |e| {
            if e.name == "Save 3" || e.name == "Save 7" {
                Err(SaveError::crypto("boom"))
            } else {
                Ok(())
            }
        });
        assert_eq!((tally.done, tally.failed), (8, 2));
        assert_eq!(tally.summary("Copied"), "Copied 8/10 saves (2 failed)");
        assert_eq!(ui.progress.len(), 10);
        assert_eq!(ui.progress.last().unwrap().0, 10);
    }

    #[test]
    fn test_each_match_called_once() {
        let mut entries = list(6);
        entries[1].toggle_selected();
        entries[4].toggle_selected();
        entries[4].kind = SaveType::Ps1;
        entries[4].flags = SaveFlags::PS1;

        let mut calls = Vec::new();
        let mut ui = ScriptedFrontend::default();
        let tally = for_each(
            &entries,
            Selection::Selected,
            |e| e.kind == SaveType::Psp,
            &mut ui,
            |e| {
                calls.push(e.name.clone());
                Ok(())
            },
        );
        assert_eq!(calls, vec!["Save 2"]);
        assert_eq!(tally.total(), 1);
    }

    #[test]
    fn test_empty_selection() {
        let entries = list(3);
        let mut ui = ScriptedFrontend::default();
        let tally = for_each(&entries, Selection::Selected, |_| true, &mut ui, |_| Ok(()));
        assert_eq!(tally, BulkTally::default());
        assert!(ui.progress.is_empty());
    }
}
