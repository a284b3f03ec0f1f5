//! The user's current focus: a single element or a set of content blocks.

use canvas_types::{BlockDetail, Selection};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionModel {
    current: Option<Selection>,
}

impl SelectionModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select one element, replacing any block selection. `None` clears.
    pub fn select_element(&mut self, key: Option<&str>, label: Option<&str>) {
        self.current = key
            .filter(|key| !key.trim().is_empty())
            .map(|key| Selection::Element {
                key: key.to_owned(),
                label: label.map(str::to_owned),
            });
    }

    /// Replace the selection with `ids`. Duplicates are dropped; an empty set clears.
    pub fn select_blocks(&mut self, ids: Vec<String>, details: Vec<BlockDetail>) {
        let mut unique: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        if unique.is_empty() {
            self.current = None;
            return;
        }
        let details = details
            .into_iter()
            .filter(|detail| unique.contains(&detail.id))
            .collect();
        self.current = Some(Selection::Blocks {
            ids: unique,
            details,
        });
    }

    /// Add `id` to the block selection, or remove it if already selected.
    ///
    /// Toggling while an element is selected starts a fresh block selection.
    pub fn toggle_block(&mut self, id: &str, detail: Option<BlockDetail>) {
        match &mut self.current {
            Some(Selection::Blocks { ids, details }) => {
                if let Some(pos) = ids.iter().position(|existing| existing == id) {
                    ids.remove(pos);
                    details.retain(|d| d.id != id);
                    if ids.is_empty() {
                        self.current = None;
                    }
                } else {
                    ids.push(id.to_owned());
                    details.extend(detail);
                }
            }
            _ => {
                self.current = Some(Selection::Blocks {
                    ids: vec![id.to_owned()],
                    details: detail.into_iter().collect(),
                });
            }
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Take the selection for an outgoing message, leaving nothing selected.
    pub fn take(&mut self) -> Option<Selection> {
        self.current.take()
    }

    #[must_use]
    pub fn current(&self) -> Option<&Selection> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn selected_element(&self) -> Option<&str> {
        self.current.as_ref().and_then(Selection::element_key)
    }

    #[must_use]
    pub fn selected_blocks(&self) -> &[String] {
        self.current
            .as_ref()
            .map_or(&[] as &[String], Selection::block_ids)
    }
}
