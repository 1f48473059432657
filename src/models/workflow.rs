use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use tracing::debug;

use super::{FolderId, WorkflowId};
use crate::error::{Error, Result};

/// How a workflow combines the results of its triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionLogic {
    /// Every trigger must match.
    #[serde(rename = "AND")]
    And,
    /// At least one trigger must match.
    #[default]
    #[serde(rename = "OR")]
    Or,
}

impl ConditionLogic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl FromStr for ConditionLogic {
    type Err = Error;

    /// Empty input means the default (`OR`).
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AND" => Ok(Self::And),
            "OR" | "" => Ok(Self::Or),
            other => Err(Error::validation(format!(
                "unknown condition logic: {other}"
            ))),
        }
    }
}

/// String comparison used by URL and keyword triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Contains,
    Equals,
    Regex,
}

impl MatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Equals => "equals",
            Self::Regex => "regex",
        }
    }

    fn parse(raw: Option<&str>) -> Result<Self> {
        match raw.unwrap_or("") {
            "" | "contains" => Ok(Self::Contains),
            "equals" => Ok(Self::Equals),
            "regex" => Ok(Self::Regex),
            other => Err(Error::validation(format!("unknown match_mode: {other}"))),
        }
    }
}

/// Which bookmark text a keyword trigger inspects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordField {
    #[default]
    Title,
    Description,
    /// Title and description joined by a single space.
    Both,
}

impl KeywordField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Both => "both",
        }
    }

    fn parse(raw: Option<&str>) -> Result<Self> {
        match raw.unwrap_or("") {
            "" | "title" => Ok(Self::Title),
            "description" => Ok(Self::Description),
            "both" => Ok(Self::Both),
            other => Err(Error::validation(format!("unknown keyword field: {other}"))),
        }
    }
}

/// Bookmark lifecycle events usable as triggers.
///
/// An event trigger is satisfied by the fact that the engine was invoked for
/// that event; it never inspects bookmark state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    BookmarkCreated,
    BookmarkUpdated,
    BookmarkDeleted,
    TitleChanged,
    DescriptionAdded,
    BookmarkTagged,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BookmarkCreated => "bookmark_created",
            Self::BookmarkUpdated => "bookmark_updated",
            Self::BookmarkDeleted => "bookmark_deleted",
            Self::TitleChanged => "title_changed",
            Self::DescriptionAdded => "description_added",
            Self::BookmarkTagged => "bookmark_tagged",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "bookmark_created" => Some(Self::BookmarkCreated),
            "bookmark_updated" => Some(Self::BookmarkUpdated),
            "bookmark_deleted" => Some(Self::BookmarkDeleted),
            "title_changed" => Some(Self::TitleChanged),
            "description_added" => Some(Self::DescriptionAdded),
            "bookmark_tagged" => Some(Self::BookmarkTagged),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comparison of some bookmark text against a configured value.
///
/// Regex patterns are compiled once, on construction. A pattern that does not
/// compile is kept so it round-trips, but never matches.
#[derive(Debug, Clone)]
pub struct TextMatch {
    mode: MatchMode,
    value: String,
    case_sensitive: bool,
    regex: Option<Regex>,
}

impl TextMatch {
    pub fn new(mode: MatchMode, value: impl Into<String>, case_sensitive: bool) -> Self {
        let value = value.into();
        let regex = match mode {
            MatchMode::Regex => RegexBuilder::new(&value)
                .case_insensitive(!case_sensitive)
                .build()
                .inspect_err(|e| debug!(pattern = %value, error = %e, "Regex trigger does not compile"))
                .ok(),
            _ => None,
        };
        Self {
            mode,
            value,
            case_sensitive,
            regex,
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// The compiled pattern, for regex matches that compiled.
    pub fn regex(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }
}

impl PartialEq for TextMatch {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode
            && self.value == other.value
            && self.case_sensitive == other.case_sensitive
    }
}

impl Eq for TextMatch {}

/// A predicate evaluated against a bookmark.
///
/// Serialized as `{"trigger_type": ..., "config": {...}}`. Trigger types this
/// version does not know are kept verbatim in [`Trigger::Unknown`] and never match.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::large_enum_variant)]
pub enum Trigger {
    /// Always case-sensitive.
    UrlMatch(TextMatch),
    KeywordMatch {
        field: KeywordField,
        matcher: TextMatch,
    },
    Event(LifecycleEvent),
    Unknown {
        trigger_type: String,
        config: Value,
    },
}

impl Trigger {
    /// Builds a URL trigger.
    pub fn url(mode: MatchMode, value: impl Into<String>) -> Self {
        Self::UrlMatch(TextMatch::new(mode, value, true))
    }

    /// Builds a case-insensitive keyword trigger.
    pub fn keyword(field: KeywordField, mode: MatchMode, value: impl Into<String>) -> Self {
        Self::KeywordMatch {
            field,
            matcher: TextMatch::new(mode, value, false),
        }
    }

    /// Parses a trigger from its persisted type name and JSON configuration.
    ///
    /// Missing keys take their defaults; keys with the wrong JSON type or
    /// unknown enumeration values are validation errors.
    pub fn from_parts(trigger_type: &str, config: Value) -> Result<Self> {
        match trigger_type {
            "url_match" => {
                let obj = config_object(&config, trigger_type)?;
                Ok(Self::UrlMatch(TextMatch::new(
                    MatchMode::parse(opt_str(obj, "match_mode")?)?,
                    opt_str(obj, "value")?.unwrap_or_default(),
                    true,
                )))
            }
            "keyword_match" => {
                let obj = config_object(&config, trigger_type)?;
                Ok(Self::KeywordMatch {
                    field: KeywordField::parse(opt_str(obj, "field")?)?,
                    matcher: TextMatch::new(
                        MatchMode::parse(opt_str(obj, "match_mode")?)?,
                        opt_str(obj, "value")?.unwrap_or_default(),
                        opt_bool(obj, "case_sensitive")?.unwrap_or(false),
                    ),
                })
            }
            other => match LifecycleEvent::parse(other) {
                Some(event) => Ok(Self::Event(event)),
                None => Ok(Self::Unknown {
                    trigger_type: other.to_string(),
                    config,
                }),
            },
        }
    }

    /// Returns the persisted type name.
    pub fn trigger_type(&self) -> &str {
        match self {
            Self::UrlMatch(_) => "url_match",
            Self::KeywordMatch { .. } => "keyword_match",
            Self::Event(event) => event.as_str(),
            Self::Unknown { trigger_type, .. } => trigger_type,
        }
    }

    /// Returns the persisted JSON configuration.
    pub fn config(&self) -> Value {
        match self {
            Self::UrlMatch(m) => json!({
                "match_mode": m.mode.as_str(),
                "value": m.value,
            }),
            Self::KeywordMatch { field, matcher } => json!({
                "field": field.as_str(),
                "match_mode": matcher.mode.as_str(),
                "value": matcher.value,
                "case_sensitive": matcher.case_sensitive,
            }),
            Self::Event(_) => json!({}),
            Self::Unknown { config, .. } => config.clone(),
        }
    }
}

/// A side effect executed when a workflow matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Adds the bookmark to a folder. Adding twice is a no-op.
    MoveToFolder { folder_id: FolderId },
    /// Action types this version does not know; ignored when executed.
    Unknown { action_type: String, config: Value },
}

impl Action {
    /// Parses an action from its persisted type name and JSON configuration.
    pub fn from_parts(action_type: &str, config: Value) -> Result<Self> {
        match action_type {
            "move_to_folder" => {
                let obj = config_object(&config, action_type)?;
                let folder_id = obj.get("folder_id").and_then(number_as_i64).ok_or_else(|| {
                    Error::validation("move_to_folder requires a numeric folder_id")
                })?;
                Ok(Self::MoveToFolder {
                    folder_id: FolderId::new(folder_id),
                })
            }
            other => Ok(Self::Unknown {
                action_type: other.to_string(),
                config,
            }),
        }
    }

    pub fn action_type(&self) -> &str {
        match self {
            Self::MoveToFolder { .. } => "move_to_folder",
            Self::Unknown { action_type, .. } => action_type,
        }
    }

    pub fn config(&self) -> Value {
        match self {
            Self::MoveToFolder { folder_id } => json!({ "folder_id": folder_id.get() }),
            Self::Unknown { config, .. } => config.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawTrigger {
    trigger_type: String,
    #[serde(default)]
    config: Value,
}

impl Serialize for Trigger {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawTrigger {
            trigger_type: self.trigger_type().to_string(),
            config: self.config(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Trigger {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawTrigger::deserialize(deserializer)?;
        Trigger::from_parts(&raw.trigger_type, raw.config).map_err(serde::de::Error::custom)
    }
}

#[derive(Serialize, Deserialize)]
struct RawAction {
    action_type: String,
    #[serde(default)]
    config: Value,
}

impl Serialize for Action {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawAction {
            action_type: self.action_type().to_string(),
            config: self.config(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawAction::deserialize(deserializer)?;
        Action::from_parts(&raw.action_type, raw.config).map_err(serde::de::Error::custom)
    }
}

/// A persisted automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    /// Ascending: lower values are evaluated first.
    pub priority: i64,
    pub condition_logic: ConditionLogic,
    pub triggers: Vec<Trigger>,
    pub actions: Vec<Action>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn default_enabled() -> bool {
    true
}

/// Input for creating a workflow or replacing one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub condition_logic: ConditionLogic,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl WorkflowDraft {
    /// Creates an enabled, OR-combined draft with no triggers or actions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            enabled: true,
            condition_logic: ConditionLogic::Or,
            triggers: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn logic(mut self, logic: ConditionLogic) -> Self {
        self.condition_logic = logic;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Checks the draft before it is persisted.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when the name is blank, a text trigger has an
    /// empty value or an invalid regex, or a folder id is not positive.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("workflow name is required"));
        }

        for trigger in &self.triggers {
            let matcher = match trigger {
                Trigger::UrlMatch(m) => m,
                Trigger::KeywordMatch { matcher, .. } => matcher,
                Trigger::Event(_) | Trigger::Unknown { .. } => continue,
            };
            if matcher.value.is_empty() {
                return Err(Error::validation(format!(
                    "{} trigger requires a value",
                    trigger.trigger_type()
                )));
            }
            if matcher.mode == MatchMode::Regex {
                Regex::new(&matcher.value).map_err(|e| {
                    Error::validation(format!("invalid regex {:?}: {e}", matcher.value))
                })?;
            }
        }

        for action in &self.actions {
            if let Action::MoveToFolder { folder_id } = action
                && folder_id.get() <= 0
            {
                return Err(Error::validation(format!(
                    "invalid folder id: {folder_id}"
                )));
            }
        }

        Ok(())
    }
}

fn config_object<'a>(config: &'a Value, kind: &str) -> Result<&'a Map<String, Value>> {
    static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
    match config {
        Value::Object(obj) => Ok(obj),
        Value::Null => Ok(EMPTY.get_or_init(Map::new)),
        _ => Err(Error::validation(format!(
            "{kind} config must be a JSON object"
        ))),
    }
}

fn opt_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(Error::validation(format!("{key} must be a string"))),
    }
}

fn opt_bool(obj: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(Error::validation(format!("{key} must be a boolean"))),
    }
}

/// JSON numbers from clients may arrive as floats (`3.0`).
fn number_as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_trigger_defaults_to_contains() {
        let trigger = Trigger::from_parts("url_match", json!({"value": "github.com"})).unwrap();
        assert_eq!(trigger, Trigger::url(MatchMode::Contains, "github.com"));
    }

    #[test]
    fn empty_match_mode_means_contains() {
        let trigger =
            Trigger::from_parts("url_match", json!({"match_mode": "", "value": "x"})).unwrap();
        assert_eq!(trigger, Trigger::url(MatchMode::Contains, "x"));
    }

    #[test]
    fn keyword_trigger_defaults_to_title_case_insensitive() {
        let trigger = Trigger::from_parts("keyword_match", json!({"value": "Rust"})).unwrap();
        assert_eq!(
            trigger,
            Trigger::keyword(KeywordField::Title, MatchMode::Contains, "Rust")
        );
    }

    #[test]
    fn unknown_match_mode_is_rejected() {
        let err = Trigger::from_parts("url_match", json!({"match_mode": "fuzzy"})).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn wrongly_typed_value_is_rejected() {
        assert!(Trigger::from_parts("url_match", json!({"value": 12})).is_err());
        assert!(Trigger::from_parts("keyword_match", json!({"case_sensitive": "yes"})).is_err());
    }

    #[test]
    fn lifecycle_names_parse_to_events() {
        let trigger = Trigger::from_parts("title_changed", Value::Null).unwrap();
        assert_eq!(trigger, Trigger::Event(LifecycleEvent::TitleChanged));
        assert_eq!(trigger.trigger_type(), "title_changed");
    }

    #[test]
    fn unknown_trigger_type_is_preserved() {
        let config = json!({"threshold": 3});
        let trigger = Trigger::from_parts("visit_count", config.clone()).unwrap();
        assert_eq!(trigger.trigger_type(), "visit_count");
        assert_eq!(trigger.config(), config);
    }

    #[test]
    fn trigger_json_shape() {
        let trigger: Trigger = serde_json::from_str(
            r#"{"trigger_type": "keyword_match", "config": {"field": "both", "match_mode": "regex", "value": "^rust", "case_sensitive": true}}"#,
        )
        .unwrap();
        assert_eq!(
            trigger,
            Trigger::KeywordMatch {
                field: KeywordField::Both,
                matcher: TextMatch::new(MatchMode::Regex, "^rust", true),
            }
        );
        let back = serde_json::to_value(&trigger).unwrap();
        assert_eq!(back["trigger_type"], "keyword_match");
        assert_eq!(back["config"]["field"], "both");
        assert_eq!(back["config"]["case_sensitive"], true);
    }

    #[test]
    fn regex_is_compiled_on_parse() {
        let config = json!({"match_mode": "regex", "value": r"^https://docs\."});
        let trigger = Trigger::from_parts("url_match", config).unwrap();
        let Trigger::UrlMatch(matcher) = &trigger else {
            panic!("expected url trigger, got {trigger:?}");
        };
        assert!(matcher.regex().is_some_and(|re| re.is_match("https://docs.rs")));

        let broken = TextMatch::new(MatchMode::Regex, "(unclosed", false);
        assert!(broken.regex().is_none());
        assert_eq!(broken.value(), "(unclosed");
    }

    #[test]
    fn move_to_folder_accepts_float_ids() {
        let action = Action::from_parts("move_to_folder", json!({"folder_id": 3.0})).unwrap();
        assert_eq!(
            action,
            Action::MoveToFolder {
                folder_id: FolderId::new(3)
            }
        );
    }

    #[test]
    fn move_to_folder_requires_folder_id() {
        assert!(Action::from_parts("move_to_folder", json!({})).is_err());
        assert!(Action::from_parts("move_to_folder", json!({"folder_id": "3"})).is_err());
    }

    #[test]
    fn unknown_action_is_preserved() {
        let action = Action::from_parts("add_tag", json!({"tag": "x"})).unwrap();
        assert_eq!(action.action_type(), "add_tag");
    }

    #[test]
    fn condition_logic_parses_and_defaults() {
        assert_eq!("AND".parse::<ConditionLogic>().unwrap(), ConditionLogic::And);
        assert_eq!("".parse::<ConditionLogic>().unwrap(), ConditionLogic::Or);
        assert!("XOR".parse::<ConditionLogic>().is_err());
    }

    #[test]
    fn draft_deserializes_with_defaults() {
        let draft: WorkflowDraft = serde_json::from_str(
            r#"{"name": "GitHub", "triggers": [{"trigger_type": "url_match", "config": {"value": "github.com"}}],
                "actions": [{"action_type": "move_to_folder", "config": {"folder_id": 1}}]}"#,
        )
        .unwrap();
        assert!(draft.enabled);
        assert_eq!(draft.condition_logic, ConditionLogic::Or);
        assert_eq!(draft.triggers.len(), 1);
        assert_eq!(draft.actions.len(), 1);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_name() {
        assert!(WorkflowDraft::new("  ").validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_regex() {
        let draft = WorkflowDraft::new("bad").trigger(Trigger::url(MatchMode::Regex, "("));
        let err = draft.validate().unwrap_err();
        assert!(err.to_string().contains("invalid regex"));
    }

    #[test]
    fn validate_rejects_empty_match_value() {
        let draft = WorkflowDraft::new("empty").trigger(Trigger::url(MatchMode::Contains, ""));
        assert!(draft.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_folder() {
        let draft = WorkflowDraft::new("folder").action(Action::MoveToFolder {
            folder_id: FolderId::new(0),
        });
        assert!(draft.validate().is_err());
    }
}
