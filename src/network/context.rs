//! Per-submission metadata threaded through every hop.

use serde::{Deserialize, Serialize};

/// Identifiers carried by every payload.
///
/// `tree_id` and `session_id` stay fixed for a whole tree; `behaviour_id` and
/// `clg_name` change on every hop. Getters return `None` for unset fields so
/// an empty string stays distinguishable from "never set".
#[derive(Debug, Serialize, Deserialize)]
pub struct Context {
    id: String,
    behaviour_id: Option<String>,
    clg_name: Option<String>,
    tree_id: Option<String>,
    session_id: Option<String>,
    information_id: Option<String>,
    expectation: Option<String>,
    /// Which walk of the tree this is: 0 for the submission, +1 per retraversal.
    #[serde(default)]
    pass: i64,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Empty context with a fresh identity.
    pub fn new() -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            behaviour_id: None,
            clg_name: None,
            tree_id: None,
            session_id: None,
            information_id: None,
            expectation: None,
            pass: 0,
        }
    }

    /// Copy every field into a context with a fresh identity.
    ///
    /// Nothing is shared with `self`, so the two evolve independently.
    pub fn fork(&self) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            behaviour_id: self.behaviour_id.clone(),
            clg_name: self.clg_name.clone(),
            tree_id: self.tree_id.clone(),
            session_id: self.session_id.clone(),
            information_id: self.information_id.clone(),
            expectation: self.expectation.clone(),
            pass: self.pass,
        }
    }

    /// This context's own identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn behaviour_id(&self) -> Option<&str> {
        self.behaviour_id.as_deref()
    }

    pub fn clg_name(&self) -> Option<&str> {
        self.clg_name.as_deref()
    }

    pub fn tree_id(&self) -> Option<&str> {
        self.tree_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn information_id(&self) -> Option<&str> {
        self.information_id.as_deref()
    }

    pub fn expectation(&self) -> Option<&str> {
        self.expectation.as_deref()
    }

    pub fn pass(&self) -> i64 {
        self.pass
    }

    pub fn set_behaviour_id(&mut self, id: impl Into<String>) {
        self.behaviour_id = Some(id.into());
    }

    pub fn set_clg_name(&mut self, name: impl Into<String>) {
        self.clg_name = Some(name.into());
    }

    pub fn set_tree_id(&mut self, id: impl Into<String>) {
        self.tree_id = Some(id.into());
    }

    pub fn set_session_id(&mut self, id: impl Into<String>) {
        self.session_id = Some(id.into());
    }

    pub fn set_information_id(&mut self, id: impl Into<String>) {
        self.information_id = Some(id.into());
    }

    pub fn set_expectation(&mut self, expectation: Option<String>) {
        self.expectation = expectation;
    }

    pub fn set_pass(&mut self, pass: i64) {
        self.pass = pass;
    }
}
