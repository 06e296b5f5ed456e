//! Action-template expansion (§4.3, GLOSSARY "Action template").
//!
//! `{IP}`, `{NICK}`, `{USER}`, `{HOST}`, `{MASK}`, `{CHAN}`, `{REASON}`,
//! `{RANDOM}` are spec.md's placeholders; `{UREAS}`/`{OREAS}` are the
//! user-/operator-facing reason templates `original_source/opm/conf.py`
//! resolves per scanset (SPEC_FULL §2).

use std::collections::HashMap;

use opm_common::random_jitter;

/// The fields a matched notice contributes to every template expansion.
pub struct NoticeContext<'a> {
    pub nick: &'a str,
    pub user: &'a str,
    pub ip: &'a str,
    /// Falls back to `ip` when `connregex` has no `host` group (§4.3 MASK
    /// is `nick!user@ip` in the general case, but prefers a captured real
    /// hostname when the notice carries one — see scenario 6 in spec.md §8).
    pub host: &'a str,
    pub chan: &'a str,
    pub reason: &'a str,
}

/// Build the substitution table for one verdict: the fixed placeholders,
/// then `UREAS`/`OREAS` expanded from the scanset's own templates using
/// that same table (so they may themselves reference `{REASON}` etc).
pub fn build_vars<'a>(
    ctx: &NoticeContext<'a>,
    user_reason_template: &str,
    oper_reason_template: &str,
) -> HashMap<&'static str, String> {
    let mask = format!("{}!{}@{}", ctx.nick, ctx.user, ctx.host);
    let mut vars = HashMap::new();
    vars.insert("NICK", ctx.nick.to_string());
    vars.insert("USER", ctx.user.to_string());
    vars.insert("IP", ctx.ip.to_string());
    vars.insert("HOST", ctx.host.to_string());
    vars.insert("MASK", mask);
    vars.insert("CHAN", ctx.chan.to_string());
    vars.insert("REASON", ctx.reason.to_string());
    vars.insert("RANDOM", random_jitter().to_string());

    let ureas = expand(user_reason_template, &vars);
    let oreas = expand(oper_reason_template, &vars);
    vars.insert("UREAS", ureas);
    vars.insert("OREAS", oreas);
    vars
}

/// Replace every `{KEY}` present in `vars`; an unknown `{KEY}` (or a bare
/// `{`/`}`) is left verbatim rather than erroring, since action templates
/// are operator-authored config, not validated input.
pub fn expand(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_scenario_6_kill_line() {
        let ctx = NoticeContext {
            nick: "n",
            user: "u",
            ip: "1.2.3.4",
            host: "h",
            chan: "#ops",
            reason: "naughty",
        };
        let vars = build_vars(&ctx, "{REASON}", "{REASON}");
        let line = expand("KILL {MASK} :{REASON}", &vars);
        assert_eq!(line, "KILL n!u@h :naughty");
    }

    #[test]
    fn ureas_and_oreas_pull_from_reason_templates() {
        let ctx = NoticeContext {
            nick: "n",
            user: "u",
            ip: "1.2.3.4",
            host: "1.2.3.4",
            chan: "#ops",
            reason: "open proxy",
        };
        let vars = build_vars(&ctx, "you are an open proxy ({REASON})", "{NICK}: {REASON}");
        assert_eq!(vars["UREAS"], "you are an open proxy (open proxy)");
        assert_eq!(vars["OREAS"], "n: open proxy");
    }

    #[test]
    fn unknown_placeholder_is_left_untouched() {
        let vars = HashMap::new();
        assert_eq!(expand("hello {NOPE}", &vars), "hello {NOPE}");
    }

    #[test]
    fn unterminated_brace_is_left_untouched() {
        let vars = HashMap::new();
        assert_eq!(expand("broken {IP", &vars), "broken {IP");
    }
}
