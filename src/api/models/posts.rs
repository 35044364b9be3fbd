use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use utoipa::{IntoParams, ToSchema};

// Post API models
//
// Output uses camelCase and omits null fields. Request bodies match property
// names case-insensitively.

/// Optional filters for the post list
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PostFilter {
    /// Match on title
    #[serde(alias = "Title")]
    pub title: Option<String>,
    /// Match on content
    #[serde(alias = "Content")]
    pub content: Option<String>,
}

/// Request body for creating a post
#[derive(Debug, ToSchema)]
pub struct CreatePostRequest {
    /// Post title (required, non-empty)
    pub title: String,
    pub content: Option<String>,
}

impl<'de> Deserialize<'de> for CreatePostRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(CreatePostVisitor)
    }
}

struct CreatePostVisitor;

impl<'de> Visitor<'de> for CreatePostVisitor {
    type Value = CreatePostRequest;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a post object")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut title: Option<String> = None;
        let mut content: Option<Option<String>> = None;

        while let Some(key) = map.next_key::<String>()? {
            if key.eq_ignore_ascii_case("title") {
                if title.is_some() {
                    return Err(de::Error::duplicate_field("title"));
                }
                title = Some(map.next_value()?);
            } else if key.eq_ignore_ascii_case("content") {
                if content.is_some() {
                    return Err(de::Error::duplicate_field("content"));
                }
                content = Some(map.next_value()?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }

        Ok(CreatePostRequest {
            title: title.ok_or_else(|| de::Error::missing_field("title"))?,
            content: content.flatten(),
        })
    }
}

/// Entry in the post list
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl PostSummary {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            title: None,
            content: None,
        }
    }
}

/// Response for a created post
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostCreatedResponse {
    pub id: i32,
}
