use neosphere_agent::init::{app_init, create_app_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("🚀 Starting Neosphere agent server...");
    let (config, state) = app_init().await?;
    log::info!("✅ Application state initialized");
    let models = state.ai_config.clone();
    let app = create_app_router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("");
    log::info!("🎉 Server started!");
    log::info!("📍 http://{}", addr);
    log::info!("📡 Chat: http://{}/api/agent/chat", addr);
    log::info!("🎬 Video: http://{}/api/agent/video", addr);
    log::info!("❤️  Health: http://{}/health", addr);
    log::info!("");
    log::info!("🧠 Chat model: {}", models.chat_model);
    log::info!("🗺️  Location model: {}", models.location_model);
    log::info!("🖼️  Image models: {} / {}", models.image_model, models.image_edit_model);
    log::info!("🔊 Speech model: {}", models.speech_model);
    log::info!("🎞️  Video model: {}", models.video_model);
    log::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
