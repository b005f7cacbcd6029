//! Class and identity collaborators
//!
//! The roster itself is managed elsewhere; this module only answers the two
//! questions the feedback view needs: which class is active, and whether the
//! current user holds elevated (tutor) access to it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{PulseError, Result};
use crate::types::ClassId;

/// Current user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserIdentity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Identity string stored on submitted entries
    pub fn submitter(&self) -> &str {
        &self.email
    }
}

/// Capability check for privileged actions on the active class
pub trait ElevatedAccess {
    fn has_elevated_access(&self) -> bool;
}

/// Roster entry for one class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassInfo {
    pub id: ClassId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tutors: Vec<String>,
    /// Empty means the class accepts feedback from anyone
    #[serde(default)]
    pub students: Vec<String>,
}

impl ClassInfo {
    pub fn is_tutor(&self, email: &str) -> bool {
        self.tutors.iter().any(|t| t.eq_ignore_ascii_case(email))
    }

    pub fn is_member(&self, email: &str) -> bool {
        self.students.is_empty()
            || self.is_tutor(email)
            || self.students.iter().any(|s| s.eq_ignore_ascii_case(email))
    }
}

/// Active class and user, resolved once and passed explicitly
#[derive(Debug, Clone)]
pub struct ClassContext {
    pub class_id: ClassId,
    pub user: UserIdentity,
    elevated: bool,
}

impl ClassContext {
    pub fn new(class_id: ClassId, user: UserIdentity, elevated: bool) -> Self {
        Self {
            class_id,
            user,
            elevated,
        }
    }
}

impl ElevatedAccess for ClassContext {
    fn has_elevated_access(&self) -> bool {
        self.elevated
    }
}

/// Read-only lookup of configured classes
#[derive(Debug, Clone, Default)]
pub struct ClassDirectory {
    classes: HashMap<ClassId, ClassInfo>,
}

impl ClassDirectory {
    pub fn new(classes: impl IntoIterator<Item = ClassInfo>) -> Self {
        Self {
            classes: classes.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    pub fn get(&self, id: &ClassId) -> Option<&ClassInfo> {
        self.classes.get(id)
    }

    pub fn list(&self) -> Vec<&ClassInfo> {
        let mut classes: Vec<_> = self.classes.values().collect();
        classes.sort_by(|a, b| a.id.cmp(&b.id));
        classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Resolve the context for `user` in class `id`
    ///
    /// Fails with `ClassNotFound` for unknown classes and `Forbidden` when the
    /// class has a roster that does not include the user.
    pub fn context_for(&self, id: &ClassId, user: UserIdentity) -> Result<ClassContext> {
        let info = self
            .get(id)
            .ok_or_else(|| PulseError::ClassNotFound(id.to_string()))?;

        if !info.is_member(&user.email) {
            return Err(PulseError::Forbidden(format!(
                "{} is not enrolled in {}",
                user.email, id
            )));
        }

        let tutor = info.is_tutor(&user.email);
        Ok(ClassContext::new(id.clone(), user, tutor))
    }
}
