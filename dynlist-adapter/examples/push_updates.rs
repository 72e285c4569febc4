use dynlist::Configuration;
use dynlist_adapter::Host;
use serde_json::json;

fn main() {
    // Example: versioned push-updates arriving out of order are buffered and applied in
    // version order once the gap is filled.
    let mut host = Host::new(Configuration::default().with_update_buffer_size(5));
    let connection = host
        .connect(
            &json!({ "listId": "chat", "startIndex": 0, "minimumInclusiveIndex": 0 }),
            Vec::new(),
        )
        .expect("valid source definition");

    let message = |version: u64, text: &str| {
        json!({
            "listId": "chat",
            "listVersion": version,
            "operations": [{
                "updateType": "InsertItem",
                "index": version as i64 - 1,
                "item": { "text": text },
            }],
        })
    };

    for (version, text) in [(1, "hello"), (3, "how are you?"), (4, "still there?"), (2, "it's me")] {
        let applied = host.process_payload(message(version, text));
        println!(
            "v{version}: applied={applied} list_version={} buffered={}",
            connection.list_version(),
            connection.buffered_update_count()
        );
    }

    // A stale duplicate is reported, not applied.
    host.process_payload(message(2, "it's me"));

    for item in host.items("chat").unwrap_or_default() {
        println!("{}", item["text"]);
    }
    for error in host.take_error_records() {
        println!("error: {error}");
    }
}
