use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Title,
    Price,
    ImageUrl,
    Description,
    Category,
    Stock,
}

#[derive(DeriveIden)]
enum MysteryBoxes {
    Table,
    Id,
    Name,
    Description,
    Category,
    Rarity,
    Discount,
    InStock,
    Price,
    ImageUrl,
    CreatedAt,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Products::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Products::Title).string_len(200).not_null())
                    .col(ColumnDef::new(Products::Price).double().not_null())
                    .col(ColumnDef::new(Products::ImageUrl).string_len(500).null())
                    .col(ColumnDef::new(Products::Description).text().null())
                    .col(ColumnDef::new(Products::Category).string_len(100).null())
                    .col(
                        ColumnDef::new(Products::Stock)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // Box sampling filters products by category.
        manager
            .create_index(
                Index::create()
                    .name("idx_products_category")
                    .table(Products::Table)
                    .col(Products::Category)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MysteryBoxes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MysteryBoxes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MysteryBoxes::Name).string_len(200).not_null())
                    .col(ColumnDef::new(MysteryBoxes::Description).text().null())
                    .col(ColumnDef::new(MysteryBoxes::Category).string_len(100).null())
                    .col(ColumnDef::new(MysteryBoxes::Rarity).string_len(50).null())
                    .col(
                        ColumnDef::new(MysteryBoxes::Discount)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(MysteryBoxes::InStock)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(MysteryBoxes::Price).double().not_null())
                    .col(ColumnDef::new(MysteryBoxes::ImageUrl).string_len(500).null())
                    .col(
                        ColumnDef::new(MysteryBoxes::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(MysteryBoxes::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_mystery_boxes_category")
                    .table(MysteryBoxes::Table)
                    .col(MysteryBoxes::Category)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MysteryBoxes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await
    }
}
