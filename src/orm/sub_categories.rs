//! SeaORM Entity for sub_categories table

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sub_categories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub super_category_id: i32,
    pub name: String,
    pub display_order: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::super_categories::Entity",
        from = "Column::SuperCategoryId",
        to = "super::super_categories::Column::Id"
    )]
    SuperCategory,
    #[sea_orm(has_many = "super::listings::Entity")]
    Listings,
}

impl Related<super::super_categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SuperCategory.def()
    }
}

impl Related<super::listings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Listings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
