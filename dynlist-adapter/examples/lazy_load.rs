use dynlist::{Configuration, FetchRequest};
use dynlist_adapter::{Host, fetch_response};
use serde_json::{Value, json};

fn serve(host: &Host, backend: &[Value], request: &FetchRequest) {
    let start = usize::try_from(request.start_index).unwrap_or(0).min(backend.len());
    let end = (start + request.count).min(backend.len());
    host.process_payload(fetch_response(request, backend[start..end].to_vec()));
}

fn main() {
    // Example: a host scrolls through a 35-item remote list, serving fetch intents from an
    // in-memory "backend". The very first request is lost and recovered by the fetch timeout.
    let backend: Vec<_> = (0..35).map(|i| json!({ "title": format!("row {i}") })).collect();

    let mut host = Host::new(
        Configuration::new("dynamicIndexList")
            .with_cache_chunk_size(10)
            .with_fetch_timeout_ms(500),
    );
    host.connect(
        &json!({
            "listId": "feed",
            "startIndex": 10,
            "minimumInclusiveIndex": 0,
            "maximumExclusiveIndex": 35,
        }),
        Vec::new(),
    )
    .expect("valid source definition");

    let mut now_ms = 0;
    let mut lost_one = false;
    for visible in [0usize, 5, 9, 15, 25, 0] {
        host.ensure("feed", visible);

        let mut lost_now = false;
        for event in host.take_fetch_requests() {
            let request = event.request;
            println!(
                "fetch token={} start={} count={}",
                request.correlation_token, request.start_index, request.count
            );
            if !lost_one {
                lost_one = true;
                lost_now = true;
                continue;
            }
            serve(&host, &backend, &request);
        }

        if lost_now {
            now_ms += 500;
            host.tick(now_ms);
            for event in host.take_fetch_requests() {
                println!("retry token={}", event.request.correlation_token);
                serve(&host, &backend, &event.request);
            }
        }

        let connection = host.connection("feed").expect("connected");
        println!(
            "visible={visible} offset={} materialized={}",
            connection.offset(),
            host.with_window("feed", |w| w.items().len()).unwrap_or(0)
        );
    }

    for error in host.take_error_records() {
        println!("error: {error}");
    }
}
