pub use sea_orm_migration::prelude::*;

mod m20251019_000001_create_todo_table;
mod m20251019_000002_add_owner_index;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251019_000001_create_todo_table::Migration),
            Box::new(m20251019_000002_add_owner_index::Migration),
        ]
    }
}
