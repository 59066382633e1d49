//! User profile read model shared by templates and the client context.

use crate::orm::users;
use sea_orm::{entity::*, DatabaseConnection, DbErr};

#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_staff: bool,
    pub send_messages: bool,
}

impl From<users::Model> for Profile {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff,
            send_messages: user.send_messages,
        }
    }
}

impl Profile {
    pub async fn get_by_id(db: &DatabaseConnection, id: i32) -> Result<Option<Self>, DbErr> {
        Ok(users::Entity::find_by_id(id)
            .one(db)
            .await?
            .map(Into::into))
    }

    /// "First Last" when both names are set, otherwise the username.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.to_owned(),
            _ => self.username.to_owned(),
        }
    }
}
