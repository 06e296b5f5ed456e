//! The IRC presence itself (§4.3): one reconnecting connection per
//! configured network, its notice pipeline, and its caches. Grounded on
//! `original_source/opm/ircpresence.py`'s `Client`/`Factory` pair, with
//! Twisted's `ReconnectingClientFactory` backoff reimplemented directly
//! (§7 "IRC transport reconnects with the standard reconnecting-client
//! backoff").

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use opm_common::{Resolver, Verdict};
use opm_engine::ScanManager;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use crate::actions::{self, NoticeContext};
use crate::cache::Cache;
use crate::challenge::{OperChallenge, RsaChallenge};
use crate::commands;
use crate::config::NetworkConfig;
use crate::error::IrcError;
use crate::glob;
use crate::parse::parse_line;
use crate::ratelimiter::OutputQueue;
use crate::wire;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

pub struct Presence {
    pub(crate) name: String,
    pub(crate) config: NetworkConfig,
    pub(crate) manager: Arc<ScanManager>,
    pub(crate) resolver: Arc<dyn Resolver>,
    connregex: Regex,
    masks: Vec<(Regex, Vec<String>)>,
    operkey_pem: Option<String>,
    pub(crate) verdict_cache: Mutex<Cache<Verdict>>,
    pub(crate) immune_cache: Mutex<Cache<()>>,
}

impl Presence {
    pub fn new(
        name: impl Into<String>,
        config: NetworkConfig,
        manager: Arc<ScanManager>,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Arc<Self>, IrcError> {
        let connregex = Regex::new(&config.connregex)?;
        let mut masks = Vec::with_capacity(config.masks.len());
        for (pattern, sets) in &config.masks {
            let compiled = glob::compile(pattern).map_err(|source| IrcError::Mask {
                pattern: pattern.clone(),
                source,
            })?;
            masks.push((compiled, sets.clone()));
        }
        let operkey_pem = match &config.operkey {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|source| IrcError::OperKey {
                path: path.clone(),
                source,
            })?),
            None => None,
        };
        let verdict_cache = Mutex::new(Cache::new(config.scan_cache_size));
        let immune_cache = Mutex::new(Cache::new(config.immune_cache_size));

        Ok(Arc::new(Self {
            name: name.into(),
            config,
            manager,
            resolver,
            connregex,
            masks,
            operkey_pem,
            verdict_cache,
            immune_cache,
        }))
    }

    /// Run forever, reconnecting with exponential backoff on every
    /// disconnect (§7). Never returns.
    pub async fn run(self: Arc<Self>) -> ! {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match Arc::clone(&self).run_once().await {
                Ok(()) => tracing::info!(net = %self.name, "connection closed"),
                Err(e) => tracing::warn!(net = %self.name, error = %e, "connection failed"),
            }
            tracing::info!(net = %self.name, delay = ?backoff, "reconnecting");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn run_once(self: Arc<Self>) -> anyhow::Result<()> {
        let stream = wire::connect(&self.config.host, self.config.port, self.config.ssl).await?;
        let (read, write) = wire::split(stream);
        let output = OutputQueue::spawn(
            write,
            self.config.message_penalty(),
            self.config.message_burst(),
            self.config.verbose,
        );

        if let Some(pass) = &self.config.pass {
            output.send(format!("PASS {pass}"));
        }
        output.send(format!("NICK {}", self.config.nick));
        output.send(format!(
            "USER {} 0 * :{}",
            self.config.username_or_nick(),
            self.config.nick
        ));

        let mut reader = BufReader::new(read).lines();
        let mut challenge: Option<RsaChallenge> = None;

        while let Some(line) = reader.next_line().await? {
            if self.config.verbose {
                tracing::debug!(net = %self.name, %line, "irc in");
            }
            let Some(msg) = parse_line(&line) else { continue };

            match msg.command.as_str() {
                "PING" => {
                    let token = msg.params.first().cloned().unwrap_or_default();
                    output.send(format!("PONG :{token}"));
                }
                "001" => {
                    challenge = self.on_welcome(&output);
                }
                "381" => self.on_youreoper(&output),
                "740" => {
                    if let (Some(c), Some(frag)) = (challenge.as_mut(), msg.params.get(1)) {
                        c.push(frag);
                    }
                }
                "741" => {
                    if let Some(mut c) = challenge.take() {
                        match c.finalise() {
                            Ok(resp) => output.send(format!("CHALLENGE +{resp}")),
                            Err(e) => {
                                tracing::warn!(net = %self.name, error = %e, "oper challenge failed")
                            }
                        }
                    }
                }
                "NOTICE" => {
                    if let (Some(prefix), Some(text)) = (&msg.prefix, msg.params.last()) {
                        if !prefix.contains('!') {
                            self.handle_notice(text, &output).await;
                        }
                    }
                }
                "PRIVMSG" => {
                    if msg.params.len() >= 2 {
                        self.handle_privmsg(&msg.params[0], &msg.params[1], &output).await;
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// NICK/USER already sent; on 001 send oper auth, AWAY, on-connect
    /// messages, and JOIN the control channel (§4.3 "Join sequence").
    fn on_welcome(&self, output: &OutputQueue) -> Option<RsaChallenge> {
        let mut challenge = None;
        let opername = self.config.opername_or_nick();

        match (&self.operkey_pem, &self.config.operpass) {
            (Some(pem), _) => match RsaChallenge::from_pem(pem) {
                Ok(c) => {
                    output.send(format!("CHALLENGE {opername}"));
                    challenge = Some(c);
                }
                Err(e) => tracing::warn!(net = %self.name, error = %e, "bad operkey"),
            },
            (None, Some(operpass)) => {
                output.send(format!("OPER {opername} {operpass}"));
            }
            (None, None) => {}
        }

        if let Some(away) = &self.config.away {
            output.send(format!("AWAY :{away}"));
        }
        for msg in &self.config.onconnectmsgs {
            output.send(format!("PRIVMSG {} :{}", msg.target, msg.message));
        }
        output.send(format!("JOIN {}", self.config.channel));

        challenge
    }

    fn on_youreoper(&self, output: &OutputQueue) {
        if let Some(mode) = &self.config.opermode {
            output.send(format!("MODE {} {}", self.config.nick, mode));
        }
        if self.config.flood_exempt {
            output.set_flood_exempt();
        }
    }

    /// §4.3 "Notice pipeline".
    async fn handle_notice(&self, text: &str, output: &OutputQueue) {
        let Some(caps) = self.connregex.captures(text) else { return };
        let nick = caps.name("nick").map(|m| m.as_str()).unwrap_or_default().to_string();
        let user = caps.name("user").map(|m| m.as_str()).unwrap_or_default().to_string();
        let Some(ip_match) = caps.name("ip") else { return };
        let ip_str = ip_match.as_str().to_string();
        let host = caps.name("host").map(|m| m.as_str()).unwrap_or(&ip_str).to_string();

        // Spoofed I-line.
        if ip_str == "0" {
            return;
        }
        let Ok(ip) = ip_str.parse::<IpAddr>() else { return };

        let ip_hostmask = format!("{nick}!{user}@{ip_str}");
        let mut scansets: Vec<String> = Vec::new();
        for (pattern, sets) in &self.masks {
            if pattern.is_match(&ip_hostmask) {
                for s in sets {
                    if !scansets.contains(s) {
                        scansets.push(s.clone());
                    }
                }
            }
        }

        if self.immune_cache.lock().await.contains(&ip_str) {
            tracing::info!(net = %self.name, host = %ip_hostmask, "immune, skipping scan");
            return;
        }

        let verdict: Verdict = {
            let cached = {
                let cache = self.verdict_cache.lock().await;
                cache.contains(&ip_str).then(|| cache.get(&ip_str).cloned()).flatten()
            };
            match cached {
                Some(v) => v,
                None => {
                    tracing::info!(net = %self.name, host = %ip_hostmask, sets = ?scansets, "scanning");
                    match self.manager.scan(ip, &scansets, None).await {
                        Ok(verdict) => {
                            self.verdict_cache.lock().await.set(
                                ip_str.clone(),
                                verdict.clone(),
                                self.config.scan_cache_ttl(),
                            );
                            verdict
                        }
                        Err(e) => {
                            tracing::warn!(net = %self.name, error = %e, "scan failed");
                            return;
                        }
                    }
                }
            }
        };

        match verdict {
            Some((set, reason)) => {
                let ctx = NoticeContext {
                    nick: &nick,
                    user: &user,
                    ip: &ip_str,
                    host: &host,
                    chan: &self.config.channel,
                    reason: &reason,
                };
                let vars = actions::build_vars(&ctx, &set.user_reason, &set.oper_reason);
                for action in &set.actions {
                    output.send(actions::expand(action, &vars));
                }
                tracing::info!(net = %self.name, mask = %vars["MASK"], reason = %vars["OREAS"], "bad verdict");
            }
            None => tracing::info!(net = %self.name, host = %ip_hostmask, "clean"),
        }
    }

    /// §4.3 "Command interface".
    async fn handle_privmsg(&self, channel: &str, message: &str, output: &OutputQueue) {
        if channel != self.config.channel {
            return;
        }

        let addressed = [
            format!("{} ", self.config.nick),
            format!("{}: ", self.config.nick),
            format!("{}, ", self.config.nick),
            format!("{}; ", self.config.nick),
        ];
        let rest = if let Some(prefix) = addressed.iter().find(|p| message.starts_with(p.as_str()))
        {
            &message[prefix.len()..]
        } else if let Some(rest) = message.strip_prefix("!topm") {
            rest.trim_start()
        } else {
            return;
        };

        let mut args: Vec<&str> = rest.split_whitespace().collect();
        if args.is_empty() {
            return;
        }
        let command = args.remove(0);
        commands::dispatch(self, channel, command, &args, output).await;
    }
}
