use mock_server::MockOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "5000".to_string());
    // BARE_BOOKS=1 serves the book list as a plain array.
    let options = MockOptions {
        paginated_books: std::env::var("BARE_BOOKS").map(|v| v != "1").unwrap_or(true),
    };
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, paginated_books = options.paginated_books, "mock library API listening");
    mock_server::run_with(listener, options).await
}
