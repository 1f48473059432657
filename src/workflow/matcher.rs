use crate::models::{
    Bookmark, ConditionLogic, KeywordField, MatchMode, TextMatch, Trigger, Workflow,
};

impl TextMatch {
    /// Tests `text` against the configured value.
    ///
    /// Case-insensitive matches compare both sides in lowercase. A regex that
    /// failed to compile never matches.
    pub fn is_match(&self, text: &str) -> bool {
        let value = self.value();
        match self.mode() {
            MatchMode::Contains if self.case_sensitive() => text.contains(value),
            MatchMode::Contains => text.to_lowercase().contains(&value.to_lowercase()),
            MatchMode::Equals if self.case_sensitive() => text == value,
            MatchMode::Equals => text.to_lowercase() == value.to_lowercase(),
            MatchMode::Regex => self.regex().is_some_and(|re| re.is_match(text)),
        }
    }
}

impl Trigger {
    /// Evaluates the trigger against a bookmark.
    ///
    /// URL triggers compare case-sensitively. Lifecycle event triggers always
    /// hold, since the engine only runs in response to those events. Unknown
    /// trigger types never hold.
    pub fn matches(&self, bookmark: &Bookmark) -> bool {
        match self {
            Trigger::UrlMatch(matcher) => matcher.is_match(&bookmark.url),
            Trigger::KeywordMatch { field, matcher } => {
                let text = match field {
                    KeywordField::Title => bookmark.title.clone(),
                    KeywordField::Description => bookmark.description.clone(),
                    KeywordField::Both => format!("{} {}", bookmark.title, bookmark.description),
                };
                matcher.is_match(&text)
            }
            Trigger::Event(_) => true,
            Trigger::Unknown { .. } => false,
        }
    }
}

impl Workflow {
    /// Combines trigger results with the workflow's condition logic.
    ///
    /// A workflow without triggers never matches.
    pub fn matches(&self, bookmark: &Bookmark) -> bool {
        if self.triggers.is_empty() {
            return false;
        }
        match self.condition_logic {
            ConditionLogic::And => self.triggers.iter().all(|t| t.matches(bookmark)),
            ConditionLogic::Or => self.triggers.iter().any(|t| t.matches(bookmark)),
        }
    }
}
