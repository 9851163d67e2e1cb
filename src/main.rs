use std::path::PathBuf;

use clap::Parser;
use course_server::{api, utils::init_log};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{Expiry, SessionManagerLayer, cookie::SameSite, cookie::time::Duration};
use tower_sessions_sqlx_store::SqliteStore;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to database file
    #[arg(short, long, default_value = "database/course.db")]
    database: PathBuf,

    /// Directory for rotating log files, stdout when absent
    #[arg(short, long)]
    log: Option<PathBuf>,

    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value = "8080")]
    port: u16,
}

#[derive(OpenApi)]
#[openapi(paths(
    course_server::api::user::signup,
    course_server::api::user::login,
    course_server::api::user::logout,
    course_server::api::user::user_info,
    course_server::api::user::enroll,
    course_server::api::user::chapter_detail,
    course_server::api::user::chapter_toggle,
    course_server::api::user::chapter_progress,
    course_server::api::public::course_list,
    course_server::api::public::course_detail,
    course_server::api::public::course_articles,
    course_server::api::public::csrf_token,
))]
struct UserApiDoc;

#[derive(OpenApi)]
#[openapi(paths(
    course_server::api::manager::login,
    course_server::api::manager::logout,
    course_server::api::manager::create_course,
    course_server::api::manager::update_course,
    course_server::api::manager::delete_course,
    course_server::api::manager::create_chapter,
    course_server::api::manager::create_article,
    course_server::api::manager::list_users,
    course_server::api::manager::list_enrollments,
))]
struct ManagerApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let _guard = init_log(args.log.clone());

    let options = SqliteConnectOptions::new()
        .filename(&args.database)
        .create_if_missing(true)
        .foreign_keys(true);
    let database = SqlitePoolOptions::new().connect_with(options).await?;
    sqlx::migrate!().run(&database).await?;

    let session_store = SqliteStore::new(database.clone());
    session_store.migrate().await?;
    let session_layer = SessionManagerLayer::new(session_store)
        .with_name("course_session")
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::days(5)));

    let app = axum::Router::new()
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/user/openapi.json", UserApiDoc::openapi())
                .url("/api-docs/manager/openapi.json", ManagerApiDoc::openapi()),
        )
        .nest("/api", api::api_router())
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(database);

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    tracing::info!("Starting server at http://{}:{}", args.host, args.port);
    tracing::info!(
        "Swagger UI available at http://{}:{}/swagger-ui/",
        args.host,
        args.port
    );
    axum::serve(listener, app).await?;

    Ok(())
}
