use thiserror::Error;

/// Ways a flat parent-referencing collection fails to form a tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    #[error("cycle detected through ids [{}]", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("'{id}' references parent '{parent}', which does not exist")]
    DanglingParent { id: String, parent: String },
}

impl TreeError {
    /// The id the error is reported against.
    pub fn id(&self) -> Option<&str> {
        match self {
            TreeError::DuplicateId(id) => Some(id),
            TreeError::Cycle(ids) => ids.first().map(String::as_str),
            TreeError::DanglingParent { id, .. } => Some(id),
        }
    }
}
