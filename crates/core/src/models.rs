use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criteria::PriceRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    Chat,
    Planning,
}

impl Intent {
    /// Only the exact label "planning" opens the catalog; anything else is a chat turn.
    pub fn from_label(value: &str) -> Self {
        if value.trim() == "planning" {
            Self::Planning
        } else {
            Self::Chat
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Planning => "planning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BudgetTier {
    Cheap,
    Moderate,
    Luxury,
}

impl BudgetTier {
    /// Parses an exact tier label. The "Any" sentinel and unknown labels yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Cheap" => Some(Self::Cheap),
            "Moderate" => Some(Self::Moderate),
            "Luxury" => Some(Self::Luxury),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cheap => "Cheap",
            Self::Moderate => "Moderate",
            Self::Luxury => "Luxury",
        }
    }

    pub fn price_range(self) -> PriceRange {
        match self {
            Self::Cheap => PriceRange::Below(3_000.0),
            Self::Moderate => PriceRange::Between(3_000.0, 10_000.0),
            Self::Luxury => PriceRange::Above(10_000.0),
        }
    }
}

/// Structured reading of one AI flow reply. Always fully populated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub intent: Intent,
    pub reasoning: Option<String>,
    pub chat_response: Option<String>,
    pub personality_profile: Option<String>,
    pub gift_suggestion: Option<String>,
    pub event_type: Option<String>,
    pub location: Option<String>,
    pub budget: Option<BudgetTier>,
    pub budget_per_head: f64,
    pub guest_count: u32,
    pub tags: Vec<String>,
    pub missing_info: Vec<String>,
}

impl AiAnalysis {
    pub fn chat(reasoning: &str, chat_response: &str) -> Self {
        Self {
            intent: Intent::Chat,
            reasoning: Some(reasoning.to_string()),
            chat_response: Some(chat_response.to_string()),
            ..Self::default()
        }
    }

    /// Used when the flow answered but the text could not be read as structured data.
    pub fn unstructured_fallback() -> Self {
        Self::chat(
            "AI returned unstructured data.",
            "I'm having trouble formatting my thoughts. Can you try again?",
        )
    }

    /// Used when the flow could not be reached or the catalog failed.
    pub fn service_fallback() -> Self {
        Self::chat(
            "AI error occurred. Using fallback.",
            "Sorry, I can't reach my planning assistant right now. Please try again in a moment.",
        )
    }

    pub fn is_planning(&self) -> bool {
        self.intent == Intent::Planning
    }

    /// Text stored as the assistant side of a conversation turn.
    pub fn assistant_text(&self) -> Option<&str> {
        self.chat_response
            .as_deref()
            .or(self.reasoning.as_deref())
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: i64,
    pub business_name: String,
    pub location_base: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: i64,
    pub vendor_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub price_per_head: Option<f64>,
    pub min_guests: u32,
    pub max_guests: u32,
    pub tags: Vec<String>,
    pub location_coverage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub session_id: String,
    pub user_message: String,
    pub ai_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub user_query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueDisplay {
    pub name: String,
    pub description: Option<String>,
    pub price_per_head: f64,
    pub tags: Vec<String>,
    pub location: Option<String>,
}

impl From<&Package> for VenueDisplay {
    fn from(package: &Package) -> Self {
        Self {
            name: package.name.clone(),
            description: package.description.clone(),
            price_per_head: package.price_per_head.unwrap_or(package.price),
            tags: package.tags.clone(),
            location: package.location_coverage.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    pub session_id: String,
    pub intent: Intent,
    pub reasoning: String,
    pub personality_profile: Option<String>,
    pub chat_response: Option<String>,
    pub gift_suggestion: Option<String>,
    pub event_type: Option<String>,
    pub location: Option<String>,
    pub budget: Option<BudgetTier>,
    pub budget_per_head: f64,
    pub guest_count: u32,
    pub venue_tags: Vec<String>,
    pub missing_info: Vec<String>,
    pub matched_venues: Vec<VenueDisplay>,
}

impl PlanResponse {
    pub fn assemble(session_id: String, analysis: AiAnalysis, matches: &[Package]) -> Self {
        Self {
            session_id,
            intent: analysis.intent,
            reasoning: analysis.reasoning.unwrap_or_default(),
            personality_profile: analysis.personality_profile,
            chat_response: analysis.chat_response,
            gift_suggestion: analysis.gift_suggestion,
            event_type: analysis.event_type,
            location: analysis.location,
            budget: analysis.budget,
            budget_per_head: analysis.budget_per_head,
            guest_count: analysis.guest_count,
            venue_tags: analysis.tags,
            missing_info: analysis.missing_info,
            matched_venues: matches.iter().map(VenueDisplay::from).collect(),
        }
    }
}
