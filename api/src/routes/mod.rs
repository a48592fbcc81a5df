pub mod backtests;
pub mod configs;
pub mod health;
pub mod hyperopts;
pub mod market_data;
pub mod pages;
pub mod strategies;

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware::{require_api_key, screen_request};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/backtests/:id/available-pairs", get(backtests::available_pairs))
        .route("/api/cache/stats", get(health::cache_stats))
        .route_layer(from_fn_with_state(state.clone(), require_api_key))
        .route_layer(from_fn_with_state(state.clone(), screen_request));

    Router::new()
        .route("/health", get(health::health_check))
        // Backtests
        .route(
            "/api/backtests",
            get(backtests::list_backtests).post(backtests::create_backtest),
        )
        .route("/api/backtests/:id", get(backtests::get_backtest))
        .route("/api/backtests/:id/retry", post(backtests::retry_backtest))
        .route("/api/backtests/:id/logs/stream", get(backtests::stream_logs))
        .route("/api/backtests/:id/plot", post(backtests::queue_plot))
        .route(
            "/api/backtests/:id/plot/logs/stream",
            get(backtests::stream_plot_logs),
        )
        .route("/api/backtests/:id/chart-data", get(backtests::chart_data))
        // Hyperopts
        .route(
            "/api/hyperopts",
            get(hyperopts::list_hyperopts).post(hyperopts::create_hyperopt),
        )
        .route(
            "/api/hyperopts/:id",
            get(hyperopts::get_hyperopt).delete(hyperopts::delete_hyperopt),
        )
        .route("/api/hyperopts/:id/retry", post(hyperopts::retry_hyperopt))
        .route("/api/hyperopts/:id/logs", get(hyperopts::get_logs))
        .route("/api/hyperopts/:id/logs/stream", get(hyperopts::stream_logs))
        .route("/api/hyperopts/:id/results", get(hyperopts::get_results))
        .route(
            "/api/hyperopts/:id/results/download",
            get(hyperopts::download_results),
        )
        .route("/api/hyperopts/:id/apply", post(hyperopts::apply_results))
        // Strategies
        .route(
            "/api/strategies",
            get(strategies::list_strategies).post(strategies::upload_strategy),
        )
        .route(
            "/api/strategies/import",
            get(strategies::scan_strategies).post(strategies::import_strategies),
        )
        .route("/api/strategies/:id", delete(strategies::delete_strategy))
        .route(
            "/api/strategies/:id/content",
            get(strategies::get_content).put(strategies::update_content),
        )
        // Configs
        .route(
            "/api/configs",
            get(configs::list_configs).post(configs::upload_config),
        )
        .route(
            "/api/configs/import",
            get(configs::scan_configs).post(configs::import_configs),
        )
        .route(
            "/api/configs/:id",
            get(configs::get_config)
                .put(configs::update_config)
                .delete(configs::delete_config),
        )
        // Market data
        .route("/api/data", get(market_data::list_market_data))
        .route("/api/data/download", post(market_data::create_download_job))
        .route("/api/data/:id", delete(market_data::delete_market_data))
        .route("/api/data/:id/logs", get(market_data::stream_download_logs))
        .route(
            "/api/market-data/import",
            get(market_data::scan_data_files).post(market_data::import_data_files),
        )
        .merge(protected)
        .nest_service("/api/plots", ServeDir::new(state.user_data.plots_dir()))
        // Pages
        .route("/", get(pages::index))
        .route("/backtests", get(pages::backtests))
        .route("/backtests/:id", get(pages::backtest_detail))
        .fallback(pages::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
