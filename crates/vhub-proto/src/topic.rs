//! Topic naming helpers.
//!
//! Topics are colon-delimited `<scope>:<id>` strings. The hub treats them as
//! opaque; these helpers only keep publishers and clients agreeing on names.

use std::fmt;

/// Well-known topic scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicScope {
    /// Activity on one event (signups, cancellations).
    Event,
    /// Activity concerning one volunteer.
    Volunteer,
}

impl TopicScope {
    /// The scope prefix as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicScope::Event => "event",
            TopicScope::Volunteer => "volunteer",
        }
    }

    /// Build the topic name for an entity in this scope.
    pub fn topic(&self, id: i64) -> String {
        format!("{}:{}", self.as_str(), id)
    }
}

impl fmt::Display for TopicScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic for an event: `event:<id>`.
pub fn event(id: i64) -> String {
    TopicScope::Event.topic(id)
}

/// Topic for a volunteer: `volunteer:<id>`.
pub fn volunteer(id: i64) -> String {
    TopicScope::Volunteer.topic(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(event(42), "event:42");
        assert_eq!(volunteer(7), "volunteer:7");
    }
}
