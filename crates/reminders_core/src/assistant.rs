//! crates/reminders_core/src/assistant.rs
//!
//! Generative-AI features: turning a sentence into a reminder draft, writing
//! recipes, and suggesting vendors.
//!
//! Providers sit behind `CompletionService`. `CompletionChain` tries them in order
//! and returns the first usable answer, so the rest of the code only ever sees a
//! single completion service.

use crate::domain::{Frequency, Recipe, RecurrenceRule, ReminderDraft, VendorRecommendation};
use crate::ports::{CompletionRequest, CompletionService, PortError, PortResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

//=========================================================================================
// Provider Chain
//=========================================================================================

/// Ordered fallback over several providers. The first success short-circuits.
pub struct CompletionChain {
    providers: Vec<Arc<dyn CompletionService>>,
    timeout: Duration,
}

impl CompletionChain {
    pub fn new(providers: Vec<Arc<dyn CompletionService>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider()).collect()
    }
}

/// Moves the schema into the prompt for providers that cannot enforce it themselves.
pub fn with_schema_instruction(request: &CompletionRequest) -> CompletionRequest {
    match &request.schema {
        Some(schema) => CompletionRequest::text(format!(
            "{}\n\nRespond ONLY with valid JSON that matches this JSON schema. \
             Do not add explanations or Markdown.\n{}",
            request.prompt,
            serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
        )),
        None => request.clone(),
    }
}

#[async_trait]
impl CompletionService for CompletionChain {
    fn provider(&self) -> &str {
        "chain"
    }

    fn supports_structured_output(&self) -> bool {
        true
    }

    async fn complete(&self, request: &CompletionRequest) -> PortResult<String> {
        let mut last_error =
            PortError::Unexpected("No completion providers are configured".to_string());

        for provider in &self.providers {
            let name = provider.provider().to_string();
            let attempt = if provider.supports_structured_output() {
                request.clone()
            } else {
                with_schema_instruction(request)
            };

            last_error = match tokio::time::timeout(self.timeout, provider.complete(&attempt)).await {
                Ok(Ok(text)) if !text.trim().is_empty() => {
                    info!(provider = %name, "Completion succeeded");
                    return Ok(text);
                }
                Ok(Ok(_)) => PortError::EmptyResponse { provider: name },
                Ok(Err(e)) => e,
                Err(_) => PortError::Timeout { provider: name },
            };
            warn!("Completion provider failed, trying the next one: {}", last_error);
        }

        Err(last_error)
    }
}

//=========================================================================================
// Assistant Features
//=========================================================================================

/// Inputs for recipe generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeRequest {
    /// A dish name or a free-text description of what to cook.
    pub prompt: String,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorQuery {
    /// What the user wants to buy, e.g. a dish or an occasion.
    pub need: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Clone)]
pub struct Assistant {
    completions: Arc<dyn CompletionService>,
}

impl Assistant {
    pub fn new(completions: Arc<dyn CompletionService>) -> Self {
        Self { completions }
    }

    /// Reads a sentence like "call mum every sunday at 6pm" into a draft.
    /// The draft is not validated; the caller decides what to do with gaps.
    pub async fn parse_reminder(&self, text: &str, now: DateTime<Utc>) -> PortResult<ReminderDraft> {
        let prompt = format!(
            "You turn a user's sentence into a reminder.\n\
             The current date and time is {} (UTC).\n\
             Resolve relative dates (\"tomorrow\", \"next friday\") against it and give `due_at` \
             as an ISO 8601 date-time. Use 09:00 when no time is given.\n\
             Pick a short lowercase `category` such as birthday, anniversary, holiday, \
             appointment, bill or other.\n\
             Only fill `recurrence` when the sentence says the reminder repeats.\n\n\
             Sentence: {}",
            now.to_rfc3339(),
            text.trim()
        );

        let parsed: ParsedReminder = self.ask_json(prompt, reminder_schema()).await?;
        parsed.into_draft()
    }

    pub async fn generate_recipe(&self, request: &RecipeRequest) -> PortResult<Recipe> {
        let mut prompt = format!("Write a home-cooking recipe for: {}.", request.prompt.trim());
        if let Some(servings) = request.servings {
            prompt.push_str(&format!("\nIt should serve {} people.", servings));
        }
        if !request.dietary_restrictions.is_empty() {
            prompt.push_str(&format!(
                "\nIt must respect these dietary restrictions: {}.",
                request.dietary_restrictions.join(", ")
            ));
        }
        prompt.push_str("\nList every ingredient with a quantity and keep the steps short.");

        let recipe: Recipe = self.ask_json(prompt, recipe_schema()).await?;
        if recipe.ingredients.is_empty() || recipe.steps.is_empty() {
            return Err(PortError::InvalidResponse(
                "The recipe has no ingredients or no steps".to_string(),
            ));
        }
        Ok(recipe)
    }

    pub async fn recommend_vendors(&self, query: &VendorQuery) -> PortResult<Vec<VendorRecommendation>> {
        let location = query
            .location
            .as_deref()
            .map(|l| format!(" near {}", l))
            .unwrap_or_default();
        let prompt = format!(
            "Suggest up to five local vendors{} for: {}.\n\
             For each give the name, what they specialise in, a rough price range and one \
             sentence on why they fit.",
            location,
            query.need.trim()
        );

        let answer: VendorList = self.ask_json(prompt, vendors_schema()).await?;
        Ok(answer.into_vec())
    }

    async fn ask_json<T: DeserializeOwned>(
        &self,
        prompt: String,
        schema: serde_json::Value,
    ) -> PortResult<T> {
        let raw = self
            .completions
            .complete(&CompletionRequest::json(prompt, schema))
            .await?;
        serde_json::from_str(extract_json(&raw))
            .map_err(|e| PortError::InvalidResponse(e.to_string()))
    }
}

/// Strips Markdown code fences and any chatter around the JSON payload.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let start = trimmed.find(|c: char| c == '{' || c == '[');
    let end = trimmed.rfind(|c: char| c == '}' || c == ']');
    match (start, end) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

//=========================================================================================
// Response Shapes
//=========================================================================================

#[derive(Debug, Deserialize)]
struct ParsedReminder {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    due_at: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    recurrence: Option<ParsedRule>,
}

#[derive(Debug, Deserialize)]
struct ParsedRule {
    frequency: String,
    #[serde(default)]
    interval: Option<u32>,
}

impl ParsedRule {
    fn into_rule(self) -> Option<RecurrenceRule> {
        let frequency = match self.frequency.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Frequency::Daily,
            "WEEKLY" => Frequency::Weekly,
            "MONTHLY" => Frequency::Monthly,
            "YEARLY" | "ANNUALLY" => Frequency::Yearly,
            _ => return None,
        };
        let interval = self.interval.and_then(NonZeroU32::new).unwrap_or(NonZeroU32::MIN);
        Some(RecurrenceRule::new(frequency, interval))
    }
}

impl ParsedReminder {
    fn into_draft(self) -> PortResult<ReminderDraft> {
        let due_at = match self.due_at.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => Some(parse_due_at(raw).ok_or_else(|| {
                PortError::InvalidResponse(format!("'{}' is not a date-time", raw))
            })?),
            None => None,
        };

        Ok(ReminderDraft {
            title: self.title.trim().to_string(),
            description: self.description.unwrap_or_default(),
            due_at,
            category: self.category,
            recurrence: self.recurrence.and_then(ParsedRule::into_rule),
        })
    }
}

/// Accepts RFC 3339, a naive date-time (taken as UTC) or a bare date (09:00 UTC).
fn parse_due_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let nine = NaiveTime::from_hms_opt(9, 0, 0)?;
    Some(date.and_time(nine).and_utc())
}

/// Providers answer either `{"vendors": [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VendorList {
    Wrapped { vendors: Vec<VendorRecommendation> },
    Bare(Vec<VendorRecommendation>),
}

impl VendorList {
    fn into_vec(self) -> Vec<VendorRecommendation> {
        match self {
            VendorList::Wrapped { vendors } | VendorList::Bare(vendors) => vendors,
        }
    }
}

//=========================================================================================
// Schemas (OpenAPI subset understood by structured-output providers)
//=========================================================================================

fn reminder_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "description": { "type": "STRING" },
            "due_at": { "type": "STRING", "description": "ISO 8601 date-time" },
            "category": { "type": "STRING" },
            "recurrence": {
                "type": "OBJECT",
                "nullable": true,
                "properties": {
                    "frequency": { "type": "STRING", "enum": ["DAILY", "WEEKLY", "MONTHLY", "YEARLY"] },
                    "interval": { "type": "INTEGER" }
                },
                "required": ["frequency", "interval"]
            }
        },
        "required": ["title", "due_at"]
    })
}

fn recipe_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "description": { "type": "STRING" },
            "servings": { "type": "INTEGER" },
            "ingredients": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "quantity": { "type": "STRING" }
                    },
                    "required": ["name", "quantity"]
                }
            },
            "steps": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["title", "ingredients", "steps"]
    })
}

fn vendors_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "vendors": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "specialty": { "type": "STRING" },
                        "price_range": { "type": "STRING" },
                        "reason": { "type": "STRING" }
                    },
                    "required": ["name"]
                }
            }
        },
        "required": ["vendors"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Answers from a fixed script and records what it was asked.
    struct Scripted {
        name: &'static str,
        structured: bool,
        answer: Result<&'static str, &'static str>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn ok(name: &'static str, answer: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                structured: false,
                answer: Ok(answer),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                structured: true,
                answer: Err("quota exceeded"),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionService for Scripted {
        fn provider(&self) -> &str {
            self.name
        }

        fn supports_structured_output(&self) -> bool {
            self.structured
        }

        async fn complete(&self, request: &CompletionRequest) -> PortResult<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.answer
                .map(str::to_string)
                .map_err(|e| PortError::provider(self.name, e))
        }
    }

    struct Hanging;

    #[async_trait]
    impl CompletionService for Hanging {
        fn provider(&self) -> &str {
            "hanging"
        }

        async fn complete(&self, _request: &CompletionRequest) -> PortResult<String> {
            std::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    fn chain(providers: Vec<Arc<dyn CompletionService>>) -> CompletionChain {
        CompletionChain::new(providers, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn falls_back_to_the_next_provider() {
        let primary = Scripted::failing("gemini");
        let fallback = Scripted::ok("openai", "hello");
        let chain = chain(vec![primary.clone(), fallback.clone()]);

        let answer = chain.complete(&CompletionRequest::text("hi")).await.unwrap();

        assert_eq!(answer, "hello");
        assert_eq!(primary.seen.lock().unwrap().len(), 1);
        assert_eq!(fallback.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let primary = Scripted::ok("gemini", "first");
        let fallback = Scripted::ok("openai", "second");
        let chain = chain(vec![primary, fallback.clone()]);

        assert_eq!(chain.complete(&CompletionRequest::text("hi")).await.unwrap(), "first");
        assert!(fallback.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn schema_becomes_a_prompt_instruction_for_plain_providers() {
        let plain = Scripted::ok("openai", "{}");
        let chain = chain(vec![plain.clone()]);

        chain
            .complete(&CompletionRequest::json("list things", json!({"type": "OBJECT"})))
            .await
            .unwrap();

        let seen = plain.seen.lock().unwrap();
        assert_eq!(seen[0].schema, None);
        assert!(seen[0].prompt.starts_with("list things"));
        assert!(seen[0].prompt.contains("\"OBJECT\""));
    }

    #[tokio::test]
    async fn reports_the_last_provider_error() {
        let chain = chain(vec![Scripted::failing("gemini"), Scripted::failing("openai")]);

        let err = chain.complete(&CompletionRequest::text("hi")).await.unwrap_err();

        assert!(matches!(err, PortError::Provider { ref provider, .. } if provider == "openai"));
    }

    #[tokio::test]
    async fn slow_and_empty_providers_count_as_failures() {
        let chain = chain(vec![Arc::new(Hanging), Scripted::ok("blank", "  ")]);

        let err = chain.complete(&CompletionRequest::text("hi")).await.unwrap_err();

        assert!(matches!(err, PortError::EmptyResponse { ref provider } if provider == "blank"));
    }

    #[tokio::test]
    async fn timeout_is_tagged_with_the_provider() {
        let chain = chain(vec![Arc::new(Hanging)]);
        let err = chain.complete(&CompletionRequest::text("hi")).await.unwrap_err();
        assert!(matches!(err, PortError::Timeout { ref provider } if provider == "hanging"));
    }

    #[tokio::test]
    async fn empty_chain_is_an_error() {
        let chain = chain(Vec::new());
        assert!(chain.complete(&CompletionRequest::text("hi")).await.is_err());
    }

    #[tokio::test]
    async fn parses_a_fenced_reminder_answer() {
        let provider = Scripted::ok(
            "gemini",
            "```json\n{\"title\": \"Call mum\", \"due_at\": \"2024-03-10T18:00:00Z\", \
             \"category\": \"other\", \"recurrence\": {\"frequency\": \"weekly\", \"interval\": 0}}\n```",
        );
        let assistant = Assistant::new(provider.clone());
        let now = Utc.with_ymd_and_hms(2024, 3, 8, 12, 0, 0).unwrap();

        let draft = assistant.parse_reminder("call mum every sunday at 6pm", now).await.unwrap();

        assert_eq!(draft.title, "Call mum");
        assert_eq!(draft.due_at, Some(Utc.with_ymd_and_hms(2024, 3, 10, 18, 0, 0).unwrap()));
        assert_eq!(draft.recurrence, Some(RecurrenceRule::every(Frequency::Weekly)));
        assert!(provider.seen.lock().unwrap()[0].prompt.contains("2024-03-08T12:00:00"));
    }

    #[tokio::test]
    async fn bare_dates_default_to_nine_am() {
        let provider = Scripted::ok("gemini", r#"{"title": "Pay rent", "due_at": "2024-04-01"}"#);
        let assistant = Assistant::new(provider);

        let draft = assistant.parse_reminder("pay rent on april 1", Utc::now()).await.unwrap();

        assert_eq!(draft.due_at, Some(Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap()));
        assert_eq!(draft.recurrence, None);
    }

    #[tokio::test]
    async fn unparseable_due_date_is_an_invalid_response() {
        let provider = Scripted::ok("gemini", r#"{"title": "x", "due_at": "soonish"}"#);
        let err = Assistant::new(provider)
            .parse_reminder("x", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn recipe_without_steps_is_rejected() {
        let provider = Scripted::ok(
            "gemini",
            r#"{"title": "Toast", "ingredients": [{"name": "bread", "quantity": "1 slice"}], "steps": []}"#,
        );
        let err = Assistant::new(provider)
            .generate_recipe(&RecipeRequest {
                prompt: "toast".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn recipe_prompt_carries_restrictions() {
        let provider = Scripted::ok(
            "gemini",
            r#"{"title": "Dal", "servings": 4, "ingredients": [{"name": "lentils", "quantity": "200 g"}], "steps": ["Simmer."]}"#,
        );
        let recipe = Assistant::new(provider.clone())
            .generate_recipe(&RecipeRequest {
                prompt: "dal".to_string(),
                servings: Some(4),
                dietary_restrictions: vec!["vegan".to_string()],
            })
            .await
            .unwrap();

        assert_eq!(recipe.title, "Dal");
        assert_eq!(recipe.servings, Some(4));
        let prompt = provider.seen.lock().unwrap()[0].prompt.clone();
        assert!(prompt.contains("serve 4"));
        assert!(prompt.contains("vegan"));
    }

    #[tokio::test]
    async fn vendor_answers_may_be_wrapped_or_bare() {
        let wrapped = Scripted::ok("gemini", r#"{"vendors": [{"name": "Bloom"}]}"#);
        let bare = Scripted::ok("gemini", r#"Here you go: [{"name": "Petal", "reason": "close"}]"#);
        let query = VendorQuery {
            need: "flowers".to_string(),
            location: Some("Lisbon".to_string()),
        };

        let first = Assistant::new(wrapped.clone()).recommend_vendors(&query).await.unwrap();
        let second = Assistant::new(bare).recommend_vendors(&query).await.unwrap();

        assert_eq!(first[0].name, "Bloom");
        assert_eq!(second[0].reason, "close");
        assert!(wrapped.seen.lock().unwrap()[0].prompt.contains("near Lisbon"));
    }

    #[test]
    fn extract_json_handles_fences_and_plain_text() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("[1]"), "[1]");
        assert_eq!(extract_json("no json here"), "no json here");
    }
}
