use rust_embed::RustEmbed;

/// Embedded SQL migrations, applied at startup by `Database::migrate`.
#[derive(RustEmbed)]
#[folder = "migrations/"]
pub struct MigrationAssets;

impl MigrationAssets {
    /// Return all embedded migrations as (filename, content) pairs sorted by
    /// filename, so version ordering follows the numeric prefix.
    pub fn get_migrations() -> Vec<(String, String)> {
        let mut migrations: Vec<(String, String)> = Self::iter()
            .filter(|name| name.ends_with(".sql"))
            .filter_map(|name| {
                Self::get(&name).map(|file| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(file.data.as_ref()).to_string(),
                    )
                })
            })
            .collect();
        migrations.sort_by(|a, b| a.0.cmp(&b.0));
        migrations
    }
}
