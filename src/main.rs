//! Exam State - demo server
//!
//! Runs the state layer over an in-memory store seeded with a small demo
//! data set.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use chrono::{TimeDelta, Utc};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use exam_state::domain::{
    CourseDraft, ExamDraft, GivenExamDraft, QuestionDraft, Secret, TopicDraft, UserDraft,
    UserRole,
};
use exam_state::exam::ExamSchedule;
use exam_state::store::{EntityStore, MemoryBackend};
use exam_state::{create_router, AppState, Config, LogMailer, SharedClock, StateLayer, SystemClock};

/// Main entry point for the exam state server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Seed the in-memory store and build the state layer
/// 4. Start background TTL sweep task
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exam_state=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting exam state server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, cache_ttl={}s, negative_cache_ttl={}s, sweep_interval={}s",
        config.server_port, config.cache_ttl, config.negative_cache_ttl, config.sweep_interval
    );

    let clock: SharedClock = Arc::new(SystemClock);
    let backend = MemoryBackend::new(clock.clone());
    seed_demo_data(&backend)
        .await
        .context("failed to seed demo data")?;
    info!("Demo data seeded");

    let port = config.server_port;
    let layer = StateLayer::new(config, backend.stores(), clock, Arc::new(LogMailer))
        .context("invalid redirect url in configuration")?;

    let sweep = layer.start_sweeper();
    let app = create_router(AppState::new(layer));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    sweep.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Fills the store with one course, an exam that opens shortly and a
/// student registered for it.
async fn seed_demo_data(backend: &MemoryBackend) -> anyhow::Result<()> {
    for (user_id, full_name, role) in [
        ("admin", "Site Admin", UserRole::Admin),
        ("teacher", "Demo Teacher", UserRole::Teacher),
        ("student", "Demo Student", UserRole::Student),
    ] {
        backend
            .users
            .insert(UserDraft {
                user_id: user_id.to_string(),
                full_name: full_name.to_string(),
                email: format!("{user_id}@example.com"),
                password: Secret::new(format!("{user_id}-pass")),
                role,
            })
            .await?;
    }

    let topic = backend
        .topics
        .insert(TopicDraft {
            topic_name: "Mathematics".to_string(),
        })
        .await?;
    let course = backend
        .courses
        .insert(CourseDraft {
            course_name: "Linear Algebra".to_string(),
            course_description: "Vectors, matrices and linear maps".to_string(),
            topic_id: Some(topic.topic_id),
            added_by: "admin".to_string(),
        })
        .await?;

    let exam = backend
        .exams
        .insert(ExamDraft {
            course_id: course.course_id,
            exam_title: "Midterm".to_string(),
            exam_description: "Chapters one to four".to_string(),
            price: "0".to_string(),
            schedule: ExamSchedule::new(Utc::now() + TimeDelta::minutes(5), 60),
            created_by: "teacher".to_string(),
            is_public: true,
        })
        .await?;

    for (title, options) in [
        ("What is the rank of the identity matrix of size 3?", ["1", "2", "3", "0"]),
        ("Which matrix has no inverse?", ["Identity", "Zero", "Rotation", "Diagonal with ones"]),
    ] {
        backend
            .questions
            .insert(QuestionDraft {
                exam_id: exam.exam_id,
                question_title: title.to_string(),
                description: None,
                options: options.map(|option| Some(option.to_string())),
            })
            .await?;
    }

    backend
        .given_exams
        .insert(GivenExamDraft {
            user_id: "student".to_string(),
            exam_id: exam.exam_id,
            price: exam.price.clone(),
            added_by: Some("admin".to_string()),
        })
        .await?;

    info!(exam_id = exam.exam_id, "demo exam opens in five minutes");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
