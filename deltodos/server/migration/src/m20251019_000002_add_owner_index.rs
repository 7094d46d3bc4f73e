use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Listing always filters by owner and sorts by creation time.
        manager
            .create_index(
                Index::create()
                    .name("idx_todo_owner_id_created_at")
                    .table(Todo::Table)
                    .col(Todo::OwnerId)
                    .col(Todo::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_todo_owner_id_created_at")
                    .table(Todo::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Todo {
    Table,
    OwnerId,
    CreatedAt,
}
