use actix_web::{middleware::Logger, web, App, HttpServer};
use std::error::Error;
use tracing_subscriber::EnvFilter;

use student_tracker::api;
use student_tracker::database::Database;
use student_tracker::model::init_shared_classifier;
use student_tracker::Settings;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("student_tracker=info,actix_web=info")),
        )
        .init();

    let settings = Settings::from_env();
    tracing::info!("Starting Student Performance Tracker");

    let model = init_shared_classifier(&settings)?;
    let info = model.info();
    tracing::info!(
        "Model ready: {} trees, hold-out accuracy {:.2}%",
        info.n_estimators,
        info.holdout_accuracy * 100.0
    );

    let db = Database::connect(&settings.database_url()).await?;

    let model_data = web::Data::from(model);
    let db_data = web::Data::new(db);

    tracing::info!("Listening on http://{}:{}", settings.host, settings.port);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(model_data.clone())
            .app_data(db_data.clone())
            .configure(api::configure)
    })
    .bind((settings.host.as_str(), settings.port))?
    .run()
    .await?;

    Ok(())
}
