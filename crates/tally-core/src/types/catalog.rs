use serde::{Deserialize, Serialize};

/// Partial profile update, merge-upserted last-write-wins.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub user_name: Option<String>,
    pub avatar: Option<String>,
}

impl ProfilePatch {
    pub fn named(user_name: impl Into<String>) -> Self {
        Self {
            user_name: Some(user_name.into()),
            avatar: None,
        }
    }

    pub fn with_avatar(mut self, avatar: Option<String>) -> Self {
        self.avatar = avatar;
        self
    }
}

/// Denormalized item reference data, replaced wholesale on upsert.
///
/// The item name doubles as the id, matching the source catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub rarity: Option<String>,
    pub image: Option<String>,
}

/// Box (case) reference data: what it costs to open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxInfo {
    pub id: String,
    pub name: String,
    pub price: f64,
}
