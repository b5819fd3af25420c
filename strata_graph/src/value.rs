// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;
use std::sync::Arc;

/// A value flowing through the graph.
///
/// [`Value::Absent`] is the propagated "no value here" marker: a
/// [`crate::Edge::Function`] node that receives it on any input produces it
/// right back out instead of invoking the user closure, which is how a
/// [`crate::Edge::Switch`] branch that didn't fire lets downstream function
/// chains no-op their way to the join point instead of erroring.
#[derive(Clone)]
pub enum Value {
    /// No value flowed to this point — a filtered-out branch, or an
    /// optional input the caller omitted.
    Absent,
    /// An opaque, reference-counted payload. The graph itself never
    /// inspects the contents; only user-supplied closures do.
    Payload(Arc<dyn std::any::Any + Send + Sync>),
}

impl Value {
    /// Wraps a typed value as a graph [`Value`].
    pub fn new<T: std::any::Any + Send + Sync>(value: T) -> Self {
        Self::Payload(Arc::new(value))
    }

    /// `true` if this is the absent marker.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Downcasts the payload to `T`, or `None` if absent or of a different
    /// type.
    pub fn downcast_ref<T: std::any::Any>(&self) -> Option<&T> {
        match self {
            Self::Absent => None,
            Self::Payload(value) => value.downcast_ref(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "Absent"),
            Self::Payload(_) => write!(f, "Payload(..)"),
        }
    }
}
