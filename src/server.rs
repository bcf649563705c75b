//! Actix-Web API around the smart scraper.
//!
//! `GET /` serves the API docs. `GET /scrape` (query string) and
//! `POST /scrape` (JSON body) scrape a URL in-process and answer with the
//! page content as plain text, or a JSON envelope.

use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::http::header::ContentType;
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::output::{ContentEnvelope, ContentMode};
use crate::pipeline::SmartScraper;

/// Responses larger than this many characters are cut.
pub const MAX_CONTENT_CHARS: usize = 1_000_000;
pub const TRUNCATION_MARKER: &str = "\n\n... [CONTENT TRUNCATED - Response too large] ...";

const MISSING_URL: &str = "URL parameter is required. Use either JSON body \
    {\"url\": \"...\", \"mode\": \"...\"} or query params ?url=...&mode=...";

pub struct AppState {
    pub scraper: Arc<SmartScraper>,
}

/// Parameters accepted from the query string or the JSON body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapeRequest {
    pub url: Option<String>,
    /// `full` or `stats`; anything but `full` means stats.
    pub mode: Option<String>,
    pub include_content: Option<bool>,
}

impl ScrapeRequest {
    fn content_mode(&self) -> ContentMode {
        match self.mode.as_deref().map(str::trim) {
            Some(m) if !m.eq_ignore_ascii_case("full") => ContentMode::Stats,
            _ => ContentMode::Full,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
}

/// Cuts `content` to `max` characters, appending the truncation marker.
#[must_use]
pub fn truncate_content(content: String, max: usize) -> String {
    match content.char_indices().nth(max) {
        Some((cut, _)) => {
            let mut truncated = content;
            truncated.truncate(cut);
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        None => content,
    }
}

fn json_response(status: StatusCode, body: &impl Serialize) -> HttpResponse {
    HttpResponse::build(status).json(body)
}

fn bad_request(message: &str) -> HttpResponse {
    json_response(
        StatusCode::BAD_REQUEST,
        &ErrorBody {
            success: false,
            error: message,
        },
    )
}

async fn handle_scrape(state: &AppState, request: ScrapeRequest) -> HttpResponse {
    let url = request.url.as_deref().map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return bad_request(MISSING_URL);
    }
    let mode = request.content_mode();
    let include_content = request.include_content.unwrap_or(true);
    info!(
        "Processing scrape request: url={} mode={:?} include_content={}",
        url, mode, include_content
    );

    let start = Instant::now();
    let outcome = match state.scraper.scrape(url).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Scrape failed for {}: {}", url, e);
            let envelope = ContentEnvelope::failure(url, mode, start.elapsed(), &e.to_string());
            return json_response(StatusCode::INTERNAL_SERVER_ERROR, &envelope);
        }
    };

    let envelope = ContentEnvelope::from_outcome(&outcome, mode, include_content);
    info!(
        "Request completed in {:.2}s via {}",
        start.elapsed().as_secs_f64(),
        outcome.method
    );

    if !include_content {
        return json_response(StatusCode::OK, &envelope);
    }

    match envelope.content {
        Some(content) if !content.is_empty() => HttpResponse::Ok()
            .content_type(ContentType::plaintext())
            .body(truncate_content(content, MAX_CONTENT_CHARS)),
        _ => {
            let failure = ContentEnvelope::failure(
                url,
                mode,
                start.elapsed(),
                "Scraping failed or no content returned",
            );
            json_response(StatusCode::INTERNAL_SERVER_ERROR, &failure)
        }
    }
}

/// `GET /scrape?url=..&mode=..&include_content=..`
pub async fn scrape_get(
    state: web::Data<AppState>,
    query: web::Query<ScrapeRequest>,
) -> HttpResponse {
    handle_scrape(&state, query.into_inner()).await
}

/// `POST /scrape` with a JSON body; an empty body counts as `{}`.
pub async fn scrape_post(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ScrapeRequest::default()
    } else {
        match serde_json::from_slice::<ScrapeRequest>(&body) {
            Ok(request) => request,
            Err(e) => return bad_request(&format!("Invalid JSON in request body: {e}")),
        }
    };
    handle_scrape(&state, request).await
}

/// `GET /`
pub async fn docs() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(API_DOCS)
}

/// Any origin may call the API, including preflighted JSON POSTs.
#[must_use]
pub fn cors() -> Cors {
    Cors::permissive()
}

/// Routes, for both the real server and tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(docs)).service(
        web::resource("/scrape")
            .route(web::get().to(scrape_get))
            .route(web::post().to(scrape_post)),
    );
}

/// Serves the API until the process is stopped.
///
/// # Errors
///
/// Returns an error if the server cannot bind `host:port`.
pub async fn run_server(scraper: SmartScraper, host: &str, port: u16) -> std::io::Result<()> {
    let state = web::Data::new(AppState {
        scraper: Arc::new(scraper),
    });

    info!("Starting scraper HTTP server on http://{}:{}", host, port);
    info!("API documentation: http://{}:{}/", host, port);

    HttpServer::new(move || {
        App::new()
            .wrap(cors())
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await
}

const API_DOCS: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>finscrape HTTP API</title>
    <style>
        body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; }
        .endpoint { background: #f5f5f5; padding: 15px; margin: 10px 0; border-radius: 5px; }
        .method { background: #007acc; color: white; padding: 3px 8px; border-radius: 3px; font-size: 12px; }
        code { background: #f0f0f0; padding: 2px 5px; border-radius: 3px; }
        pre { background: #f8f8f8; padding: 15px; border-radius: 5px; overflow-x: auto; }
    </style>
</head>
<body>
    <h1>finscrape HTTP API</h1>

    <div class="endpoint">
        <h3><span class="method">POST</span> /scrape</h3>
        <p>Scrape a page and return its content directly in the response.</p>
        <pre>{
  "url": "https://www.morningstar.com/stocks/xnas/aapl/dividends",
  "mode": "full",
  "include_content": true
}</pre>
        <p><code>mode</code> is <code>full</code> (raw HTML, the default) or <code>stats</code>
        (markdown summary with a 500 character sample).</p>
    </div>

    <div class="endpoint">
        <h3><span class="method">GET</span> /scrape</h3>
        <p>Same parameters as a query string:</p>
        <code>/scrape?url=https://finance.yahoo.com/quote/AAPL&amp;mode=stats&amp;include_content=true</code>
    </div>

    <h2>Responses</h2>
    <ul>
        <li><strong>include_content=true:</strong> 200 <code>text/plain</code> with the content (cut at 1,000,000 characters).</li>
        <li><strong>include_content=false:</strong> 200 JSON with method, duration and content length.</li>
        <li><strong>Missing URL or bad JSON:</strong> 400 JSON.</li>
        <li><strong>Scrape failure:</strong> 500 JSON with the error.</li>
    </ul>
</body>
</html>
"#;
