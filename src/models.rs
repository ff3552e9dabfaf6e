use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
        )]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(StudentId);
id_type!(RegionId);
id_type!(ConservationId);
id_type!(TopicId);
id_type!(AssessmentId);
id_type!(BadgeId);

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    pub full_name: String,
    pub email: Option<String>,
    pub region_id: Option<RegionId>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Conservation {
    pub id: ConservationId,
    pub region_id: RegionId,
    pub title: String,
    pub description: String,
    #[sqlx(rename = "position")]
    pub order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: TopicId,
    pub conservation_id: ConservationId,
    pub title: String,
    pub description: String,
    #[sqlx(rename = "position")]
    pub order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct McqOption {
    pub text: String,
    pub is_correct: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<McqOption>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: AssessmentId,
    pub topic_id: Option<TopicId>,
    pub conservation_id: Option<ConservationId>,
    pub kind: String,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "badge_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BadgeType {
    TopicCompletion,
    ConservationCompletion,
    AssessmentExcellence,
    ConservationMaster,
    WildlifeExpert,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub id: BadgeId,
    pub name: String,
    pub description: String,
    #[sqlx(rename = "kind")]
    #[serde(rename = "type")]
    pub badge_type: BadgeType,
    pub icon_url: String,
    pub points: i32,
    pub topic_id: Option<TopicId>,
    pub conservation_id: Option<ConservationId>,
    /// Minimum score percentage required.
    pub required_score: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StudentBadge {
    pub id: Uuid,
    pub student_id: StudentId,
    pub badge_id: BadgeId,
    pub earned_at: DateTime<Utc>,
    /// Percentage achieved when the badge was earned.
    pub score: i32,
}

/// A catalog badge joined with the learner's award record.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EarnedBadge {
    #[serde(flatten)]
    pub badge: Badge,
    pub earned_at: DateTime<Utc>,
    pub score: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewBadge {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub badge_type: BadgeType,
    pub icon_url: String,
    #[serde(default)]
    pub points: i32,
    pub topic_id: Option<TopicId>,
    pub conservation_id: Option<ConservationId>,
    #[serde(default)]
    pub required_score: i32,
}

impl NewBadge {
    pub fn into_badge(self) -> Badge {
        Badge {
            id: BadgeId::new(),
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            badge_type: self.badge_type,
            icon_url: self.icon_url,
            points: self.points,
            topic_id: self.topic_id,
            conservation_id: self.conservation_id,
            required_score: self.required_score,
            created_at: Utc::now(),
        }
    }
}
