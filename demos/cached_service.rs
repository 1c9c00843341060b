//! End-to-end tour of the caching pipeline: dispatch, hit, purge, re-dispatch.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example cached_service
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cachet::cache::{CacheConfig, CacheMiddleware, MemoryStore, PurgeAuthority, RouteBinding};
use cachet::middleware::{LoggerMiddleware, MiddlewareHandler, Next, from_middleware};
use cachet::{Context, Method, Request, Response, StatusCode};
use serde_json::json;

const WIDGET_REQUEST: &[u8] = b"GET /widgets/42 HTTP/1.1\r\nHost: demo\r\n\r\n";

async fn dispatch(chain: &[MiddlewareHandler], raw: &[u8]) -> Response {
    let (request, _) = Request::parse(raw).expect("well-formed demo request");
    Next::new(chain.to_vec()).run(Context::new(request)).await
}

fn describe(label: &str, response: &Response) {
    println!(
        "{label}: {} x-cache={} expires={}",
        response.status(),
        response.headers().get("x-cache").unwrap_or("-"),
        response.headers().get("expires").unwrap_or("-"),
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // One route, cached for a minute, purgeable with a shared secret.
    let config = CacheConfig::from_value(json!({
        "purgeable": true,
        "expiresAt": "1 minute",
        "secretKey": "letmein",
    }))?;
    let binding = Arc::new(RouteBinding::bind(Method::Get, "/widgets/:id", config)?);
    let store = Arc::new(MemoryStore::new());

    // The "expensive" handler we want to avoid re-running.
    let lookups = Arc::new(AtomicUsize::new(0));
    let handler: MiddlewareHandler = {
        let lookups = Arc::clone(&lookups);
        Arc::new(move |ctx: Context, _next: Next| {
            let lookups = Arc::clone(&lookups);
            let id = ctx
                .request()
                .path()
                .rsplit('/')
                .next()
                .unwrap_or("0")
                .to_owned();
            Box::pin(async move {
                let lookup = lookups.fetch_add(1, Ordering::SeqCst) + 1;
                Response::new(StatusCode::Ok)
                    .header("Content-Type", "application/json")
                    .body(format!(r#"{{"widget":{id},"lookup":{lookup}}}"#))
            })
        })
    };

    let chain: Vec<MiddlewareHandler> = vec![
        from_middleware(Arc::new(LoggerMiddleware)),
        from_middleware(Arc::new(CacheMiddleware::new(
            Arc::clone(&binding),
            store.clone(),
        ))),
        handler,
    ];

    let first = dispatch(&chain, WIDGET_REQUEST).await;
    describe("first dispatch ", &first);

    let second = dispatch(&chain, WIDGET_REQUEST).await;
    describe("second dispatch", &second);
    println!(
        "handler ran {} time(s) across two dispatches",
        lookups.load(Ordering::SeqCst)
    );

    // Out-of-band purge: wrong secret is rejected, right secret deletes.
    let authority = PurgeAuthority::new(store.clone());
    let (purge_probe, _) = Request::parse(WIDGET_REQUEST)?;

    match authority.purge_request(&binding, &purge_probe, "guess").await {
        Ok(_) => unreachable!("a wrong secret must not purge"),
        Err(error) => println!("purge with wrong secret: {error}"),
    }

    let removed = authority
        .purge_request(&binding, &purge_probe, "letmein")
        .await?;
    println!("purge with correct secret removed {removed} entry");

    let third = dispatch(&chain, WIDGET_REQUEST).await;
    describe("third dispatch ", &third);
    println!(
        "handler ran {} time(s) in total",
        lookups.load(Ordering::SeqCst)
    );

    println!("\nfinal response on the wire:\n");
    print!("{}", String::from_utf8_lossy(&third.into_bytes()));

    Ok(())
}
