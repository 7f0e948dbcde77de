pub use sea_orm_migration::prelude::*;

mod m20240607_224721_create_table_track;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240607_224721_create_table_track::Migration)]
    }
}
