//! The control-channel command interface (§4.3 "Command interface").

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use opm_common::OpmError;
use opm_engine::ErrorHandler;

use crate::presence::Presence;
use crate::ratelimiter::OutputQueue;

pub(crate) async fn dispatch(
    presence: &Presence,
    channel: &str,
    command: &str,
    args: &[&str],
    output: &OutputQueue,
) {
    match command {
        "check" => cmd_check(presence, channel, args, output).await,
        "stats" => cmd_stats(presence, channel, output).await,
        "help" => cmd_help(channel, output),
        "decache" => cmd_decache(presence, channel, args, output).await,
        "immune" => cmd_immune(presence, channel, args, output).await,
        _ => {}
    }
}

async fn cmd_check(presence: &Presence, channel: &str, args: &[&str], output: &OutputQueue) {
    let Some((&target, rest)) = args.split_first() else {
        output.send(format!("PRIVMSG {channel} :check what?"));
        return;
    };
    let sets: Vec<String> = if rest.is_empty() {
        vec!["default".to_string()]
    } else {
        rest.iter().map(|s| s.to_string()).collect()
    };

    let ip: IpAddr = match target.parse() {
        Ok(ip) => ip,
        Err(_) => match presence.resolver.resolve_host(target).await {
            Ok(addrs) if !addrs.is_empty() => addrs[0],
            _ => {
                output.send(format!("PRIVMSG {channel} :{target} did not resolve"));
                return;
            }
        },
    };

    let output_for_err = output.clone();
    let channel_owned = channel.to_string();
    let errhandler: ErrorHandler = Arc::new(move |_ip, err| {
        output_for_err.send(format!("PRIVMSG {channel_owned} :failure: {err}"));
    });

    match presence.manager.scan(ip, &sets, Some(errhandler)).await {
        Ok(None) => output.send(format!("PRIVMSG {channel} :{target} is clean")),
        Ok(Some((_, reason))) => {
            output.send(format!("PRIVMSG {channel} :{target} is bad: {reason}"))
        }
        Err(OpmError::UnknownSet(name)) => {
            output.send(format!("PRIVMSG {channel} :unknown scanset {name}"))
        }
        Err(e) => output.send(format!("PRIVMSG {channel} :failure: {e}")),
    }
}

async fn cmd_stats(presence: &Presence, channel: &str, output: &OutputQueue) {
    let mut names: Vec<&String> = presence.manager.pools().map(|(name, _)| name).collect();
    names.sort();
    for name in names {
        let Some(pool) = presence.manager.pool(name) else { continue };
        if pool.free() > 0 {
            output.send(format!("PRIVMSG {channel} :{name}: {} free", pool.free()));
        } else {
            output.send(format!("PRIVMSG {channel} :{name}: {} queued", pool.queued()));
        }
    }
    let active = presence.manager.active_scan_count().await;
    output.send(format!("PRIVMSG {channel} :{active} checks in progress"));
}

fn cmd_help(channel: &str, output: &OutputQueue) {
    output.send(format!(
        "PRIVMSG {channel} :commands: check <ip/host> [set...], stats, help, decache [ip], immune <ip> <seconds>"
    ));
}

async fn cmd_decache(presence: &Presence, channel: &str, args: &[&str], output: &OutputQueue) {
    let mut cache = presence.verdict_cache.lock().await;
    match args.first() {
        Some(ip) => {
            let removed = cache.remove(ip);
            output.send(format!(
                "PRIVMSG {channel} :{}",
                if removed { format!("decached {ip}") } else { format!("{ip} was not cached") }
            ));
        }
        None => {
            cache.clear();
            output.send(format!("PRIVMSG {channel} :verdict cache cleared"));
        }
    }
}

/// `immune <ip> <seconds>` (§4.3); extra positional arguments are ignored
/// (§9 ambiguity note on `cmd_immune`'s argument count).
async fn cmd_immune(presence: &Presence, channel: &str, args: &[&str], output: &OutputQueue) {
    let (Some(ip), Some(seconds_str)) = (args.first(), args.get(1)) else {
        output.send(format!("PRIVMSG {channel} :immune <ip> <seconds>"));
        return;
    };
    let Ok(seconds) = seconds_str.parse::<u64>() else {
        output.send(format!("PRIVMSG {channel} :invalid seconds: {seconds_str}"));
        return;
    };

    presence
        .immune_cache
        .lock()
        .await
        .set(ip.to_string(), (), Duration::from_secs(seconds));
    output.send(format!("PRIVMSG {channel} :{ip} immune for {seconds}s"));
}
