//! Built-in commands.

use std::time::Instant;

use warble_core::CommandTable;

/// Register the stock command set.
pub fn register_builtins(table: &mut CommandTable, started: Instant) {
    table.register("ping", |msg, rest| {
        Box::pin(async move {
            rest.post_text(&msg.channel_id, &format!("pong {}", msg.author_mention));
        })
    });

    table.register("uptime", move |msg, rest| {
        let up = started.elapsed().as_secs();
        Box::pin(async move {
            rest.post_text(&msg.channel_id, &format_uptime(up));
        })
    });

    table.register("about", |msg, rest| {
        Box::pin(async move {
            rest.post_embed(
                &msg.channel_id,
                "warble",
                concat!("gateway chat bot, v", env!("CARGO_PKG_VERSION")),
            );
        })
    });
}

fn format_uptime(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("up {hours}h {minutes}m {seconds}s")
}
