use layerconf::{Config, ConfigError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AppConfig {
    app: AppSection,
    database: DatabaseSection,
}

#[derive(Debug, Deserialize)]
struct AppSection {
    name: String,
    debug: bool,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct DatabaseSection {
    host: String,
    port: u16,
    name: String,
    url: String,
}

fn main() -> Result<(), ConfigError> {
    // The dev layer extends the default name through a self-reference.
    let config = Config::builder()
        .with_file("demos/default.toml", true)
        .with_file("demos/dev.toml", false)
        .with_env("LAYERCONF", "__")
        .resolve()?;

    println!("tags: {:?}", config.get_list("app.tags")?);

    let app: AppConfig = config.deserialize()?;
    println!("App: {} (debug={})", app.app.name, app.app.debug);
    println!("Database URL: {}", app.database.url);

    Ok(())
}
