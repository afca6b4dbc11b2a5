mod annotations;
mod config;
mod core;
mod domain;
mod error;
mod events;
mod render;
mod session;
#[cfg(test)]
mod test_support;
mod tiles;
mod viewer;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut config = config::AppConfig::load();
    if let Some(image) = std::env::args().nth(1) {
        config.tiles.image_url = image;
    }
    core::app::run(config)
}
