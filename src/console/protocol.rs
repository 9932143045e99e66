//! The console's OSC dialect.
//!
//! Inbound addresses are decoded once, here, into typed [`ConsoleEvent`]s;
//! downstream components never look at positional OSC arguments. Outbound
//! traffic is built from [`ConsoleRequest`] variants.

use rosc::{OscMessage, OscType};
use uuid::Uuid;

use crate::model::cue::ConsoleCueUpdate;

/// Outbound requests understood by the console.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleRequest {
    Version,
    Subscribe,
    FaderConfig,
    CueListCount,
    CueListIndex { index: usize },
    CueCount { list: u32 },
    CueIndex { list: u32, index: usize },
    Cue { list: u32, number: String },
    ActiveCue { list: u32 },
    PendingCue { list: u32 },
    /// Fallback when the count request goes unanswered.
    CueRange { list: u32 },
    /// Fallback wildcard fetch; replies carry the total count in the address.
    CueListWildcard { list: u32 },
}

impl ConsoleRequest {
    pub fn to_message(&self) -> OscMessage {
        let (addr, args) = match self {
            Self::Version => ("/eos/get/version".to_string(), vec![]),
            Self::Subscribe => ("/eos/subscribe".to_string(), vec![OscType::Int(1)]),
            Self::FaderConfig => ("/eos/get/fader/0/config".to_string(), vec![]),
            Self::CueListCount => ("/eos/get/cuelist/count".to_string(), vec![]),
            Self::CueListIndex { index } => (format!("/eos/get/cuelist/index/{index}"), vec![]),
            Self::CueCount { list } => (format!("/eos/get/cue/{list}/count"), vec![]),
            Self::CueIndex { list, index } => (format!("/eos/get/cue/{list}/index/{index}"), vec![]),
            Self::Cue { list, number } => (format!("/eos/get/cue/{list}/{number}"), vec![]),
            Self::ActiveCue { list } => (format!("/eos/get/cue/{list}/active"), vec![]),
            Self::PendingCue { list } => (format!("/eos/get/cue/{list}/pending"), vec![]),
            Self::CueRange { list } => (format!("/eos/get/cue/{list}/0/1000"), vec![]),
            Self::CueListWildcard { list } => {
                (format!("/eos/get/cuelist/{list}/cue/*/list"), vec![])
            }
        };
        OscMessage { addr, args }
    }
}

/// One cue-data reply, primary payload plus its position in the reply stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CueRecord {
    pub list: u32,
    pub number: String,
    pub part: u32,
    /// Index of this cue within the list, from the address.
    pub index: usize,
    /// Total cue count of the list, from the address.
    pub total: usize,
    pub update: ConsoleCueUpdate,
}

/// Typed inbound events.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    ShowName(String),
    Version(String),
    CueListCount(usize),
    CueListDiscovered { list: u32 },
    CueCount { list: u32, count: usize },
    CueData(CueRecord),
    CueNotify { list: u32, cue_number: Option<String>, count: usize },
    ActiveCueText { list: Option<u32>, text: String },
    PendingCueText { list: Option<u32>, text: String },
    ActiveCue { list: u32, number: String },
    PendingCue { list: u32, number: String },
    FaderConfig { index: u32, fader_type: u32, target: u32, label: String },
}

/// Decode one inbound message. `None` means "not for us": an unknown address,
/// an auxiliary sub-message, a reserved system list, or a malformed payload.
pub fn decode(msg: &OscMessage) -> Option<ConsoleEvent> {
    let segs: Vec<&str> = msg.addr.split('/').filter(|s| !s.is_empty()).collect();
    if segs.first() != Some(&"eos") || segs.get(1) != Some(&"out") {
        return None;
    }
    // Auxiliary facets of a cue (effects, external links, ...) reuse the cue
    // address family and must never be mistaken for the primary payload.
    if segs
        .iter()
        .any(|s| matches!(*s, "fx" | "actions" | "links" | "curves"))
    {
        return None;
    }
    let args = &msg.args;

    match &segs[2..] {
        ["show", "name"] => Some(ConsoleEvent::ShowName(str_arg(args, 0)?)),
        ["get", "version"] => Some(ConsoleEvent::Version(str_arg(args, 0)?)),
        ["get", "cuelist", "count"] => {
            Some(ConsoleEvent::CueListCount(int_arg(args, 0)?.max(0) as usize))
        }
        ["get", "cuelist", n, "list", _, _] => {
            Some(ConsoleEvent::CueListDiscovered { list: list_seg(n)? })
        }
        ["get", "cuelist", l, "cue", c, p, "list", i, total] => {
            cue_record(l, c, p, i, total, args).map(ConsoleEvent::CueData)
        }
        ["get", "cue", l, "count"] => Some(ConsoleEvent::CueCount {
            list: list_seg(l)?,
            count: int_arg(args, 0)?.max(0) as usize,
        }),
        ["get", "cue", l, c, p, "list", i, total] => {
            cue_record(l, c, p, i, total, args).map(ConsoleEvent::CueData)
        }
        ["notify", "cue", l, "list", _, total] => Some(ConsoleEvent::CueNotify {
            list: list_seg(l)?,
            cue_number: number_arg(args, 0),
            count: total.parse().ok()?,
        }),
        ["get", "fader", idx, "config"] => Some(ConsoleEvent::FaderConfig {
            index: idx.parse().ok()?,
            fader_type: int_arg(args, 0)?.max(0) as u32,
            target: int_arg(args, 1)?.max(0) as u32,
            label: str_arg(args, 2).unwrap_or_default(),
        }),
        ["active", "cue", "text"] => Some(ConsoleEvent::ActiveCueText {
            list: None,
            text: str_arg(args, 0).unwrap_or_default(),
        }),
        ["active", "cue", l, "text"] => Some(ConsoleEvent::ActiveCueText {
            list: Some(list_seg(l)?),
            text: str_arg(args, 0).unwrap_or_default(),
        }),
        ["active", "cue", l, c, ..] => Some(ConsoleEvent::ActiveCue {
            list: list_seg(l)?,
            number: c.to_string(),
        }),
        ["pending", "cue", "text"] => Some(ConsoleEvent::PendingCueText {
            list: None,
            text: str_arg(args, 0).unwrap_or_default(),
        }),
        ["pending", "cue", l, "text"] => Some(ConsoleEvent::PendingCueText {
            list: Some(list_seg(l)?),
            text: str_arg(args, 0).unwrap_or_default(),
        }),
        ["pending", "cue", l, c, ..] => Some(ConsoleEvent::PendingCue {
            list: list_seg(l)?,
            number: c.to_string(),
        }),
        _ => None,
    }
}

fn cue_record(
    list: &str,
    number: &str,
    part: &str,
    index: &str,
    total: &str,
    args: &[OscType],
) -> Option<CueRecord> {
    if number.is_empty() {
        return None;
    }
    let update = ConsoleCueUpdate {
        uid: str_arg(args, 1).and_then(|s| Uuid::parse_str(&s).ok()),
        label: str_arg(args, 2).unwrap_or_default(),
        up_time: time_arg(args, 3),
        up_delay: time_arg(args, 4),
        down_time: time_arg(args, 5),
        down_delay: time_arg(args, 6),
        focus_time: time_arg(args, 7),
        focus_delay: time_arg(args, 8),
        color_time: time_arg(args, 9),
        color_delay: time_arg(args, 10),
        beam_time: time_arg(args, 11),
        beam_delay: time_arg(args, 12),
        mark: str_arg(args, 16).unwrap_or_default(),
        block: str_arg(args, 17).unwrap_or_default(),
        assert_flag: str_arg(args, 18).unwrap_or_default(),
        follow_time: time_arg(args, 20),
        hang_time: time_arg(args, 21),
        // args 22..25 and 27 are under-documented and deliberately unconsumed.
        part_count: int_arg(args, 26).unwrap_or(0).max(0) as u32,
        scene: str_arg(args, 28).unwrap_or_default(),
        scene_end: bool_arg(args, 29).unwrap_or(false),
        duration: [3usize, 5, 7, 9, 11]
            .iter()
            .filter_map(|&i| time_arg(args, i))
            .fold(0.0, f64::max),
    };
    Some(CueRecord {
        list: list_seg(list)?,
        number: number.to_string(),
        part: part.parse().ok()?,
        index: index.parse().ok()?,
        total: total.parse().ok()?,
        update,
    })
}

/// Cue list from an address segment. Negative lists are reserved system
/// lists and are discarded.
fn list_seg(seg: &str) -> Option<u32> {
    let value: i64 = seg.parse().ok()?;
    u32::try_from(value).ok()
}

fn str_arg(args: &[OscType], index: usize) -> Option<String> {
    match args.get(index)? {
        OscType::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn int_arg(args: &[OscType], index: usize) -> Option<i64> {
    match args.get(index)? {
        OscType::Int(v) => Some(*v as i64),
        OscType::Long(v) => Some(*v),
        OscType::Float(v) => Some(*v as i64),
        OscType::Double(v) => Some(*v as i64),
        _ => None,
    }
}

fn bool_arg(args: &[OscType], index: usize) -> Option<bool> {
    match args.get(index)? {
        OscType::Bool(b) => Some(*b),
        OscType::Int(v) => Some(*v != 0),
        OscType::Long(v) => Some(*v != 0),
        OscType::Float(v) => Some(*v != 0.0),
        _ => None,
    }
}

/// Millisecond time component to seconds, 2 decimals. Negative means unset.
fn time_arg(args: &[OscType], index: usize) -> Option<f64> {
    let value = int_arg(args, index)?;
    if value < 0 {
        return None;
    }
    Some((value as f64 / 10.0).round() / 100.0)
}

/// A cue number carried as an OSC argument; the console is inconsistent about
/// whether it sends a string or a number.
fn number_arg(args: &[OscType], index: usize) -> Option<String> {
    match args.get(index)? {
        OscType::String(s) if !s.is_empty() => Some(s.clone()),
        OscType::Int(v) => Some(v.to_string()),
        OscType::Long(v) => Some(v.to_string()),
        OscType::Float(v) => Some(format_cue_number(*v as f64)),
        OscType::Double(v) => Some(format_cue_number(*v)),
        _ => None,
    }
}

pub fn format_cue_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Result of parsing an active/pending cue text payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CueTextOutcome {
    /// "No cue" for this slot: clear the marker on the contextual list.
    Reset,
    Parsed(ParsedCueText),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCueText {
    pub list: Option<u32>,
    pub number: String,
    pub label: String,
    pub fade_time: Option<f64>,
    pub percent: Option<u32>,
}

/// Parse `"<L>/<C> <label> <fade> <pct>%"` and its shorter variants.
///
/// Total over all inputs: every non-empty string is either a parse or a
/// reset, never an error.
pub fn parse_cue_text(text: &str) -> CueTextOutcome {
    let trimmed = text.trim();
    if trimmed.is_empty() || text.starts_with("0.0 ") || text.starts_with("0/0") {
        return CueTextOutcome::Reset;
    }
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let head = tokens[0];

    let (list, number) = match head.split_once('/') {
        Some((l, n)) if !n.is_empty() => match l.parse::<u32>() {
            Ok(list) => (Some(list), n.to_string()),
            Err(_) => (None, head.to_string()),
        },
        _ => (None, head.to_string()),
    };

    let rest = &tokens[1..];
    let (label, fade_time, percent) = parse_tail(rest);

    CueTextOutcome::Parsed(ParsedCueText {
        list,
        number,
        label,
        fade_time,
        percent,
    })
}

fn parse_tail(rest: &[&str]) -> (String, Option<f64>, Option<u32>) {
    // Label + fade + percent, label possibly empty.
    if rest.len() >= 2 {
        if let Some(pct) = rest[rest.len() - 1]
            .strip_suffix('%')
            .and_then(|p| p.parse::<u32>().ok())
        {
            if let Ok(fade) = rest[rest.len() - 2].parse::<f64>() {
                return (rest[..rest.len() - 2].join(" "), Some(fade), Some(pct));
            }
        }
    }
    // Label + fade (no percent), label possibly empty.
    if let Some(last) = rest.last() {
        if let Ok(fade) = last.parse::<f64>() {
            return (rest[..rest.len() - 1].join(" "), Some(fade), None);
        }
    }
    // The whole remainder is the label.
    (rest.join(" "), None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    #[test]
    fn decodes_show_name_and_version() {
        assert_eq!(
            decode(&msg(
                "/eos/out/show/name",
                vec![OscType::String("Hamlet".into())]
            )),
            Some(ConsoleEvent::ShowName("Hamlet".into()))
        );
        assert_eq!(
            decode(&msg(
                "/eos/out/get/version",
                vec![OscType::String("3.2.0".into())]
            )),
            Some(ConsoleEvent::Version("3.2.0".into()))
        );
    }

    #[test]
    fn decodes_cue_list_discovery() {
        assert_eq!(
            decode(&msg("/eos/out/get/cuelist/2/list/0/1", vec![])),
            Some(ConsoleEvent::CueListDiscovered { list: 2 })
        );
        // Negative lists are reserved system lists.
        assert_eq!(decode(&msg("/eos/out/get/cuelist/-1/list/0/1", vec![])), None);
    }

    #[test]
    fn decodes_cue_count() {
        assert_eq!(
            decode(&msg("/eos/out/get/cue/1/count", vec![OscType::Int(42)])),
            Some(ConsoleEvent::CueCount { list: 1, count: 42 })
        );
    }

    #[test]
    fn suppresses_auxiliary_sub_messages() {
        for facet in ["fx", "actions", "links", "curves"] {
            let addr = format!("/eos/out/get/cue/1/5/0/{facet}/list/0/1");
            assert_eq!(decode(&msg(&addr, vec![])), None);
        }
    }

    #[test]
    fn decodes_cue_data_arguments() {
        let mut args = vec![OscType::Nil; 30];
        args[0] = OscType::Int(0);
        args[1] = OscType::String("B0BAE0AD-E3B7-4FF4-BCB3-FB79BAE33E54".into());
        args[2] = OscType::String("House out".into());
        args[3] = OscType::Int(2500); // up time 2.5s
        args[4] = OscType::Int(-1); // up delay unset
        args[5] = OscType::Int(1234); // down time 1.23s
        args[16] = OscType::String("M".into());
        args[17] = OscType::String("B".into());
        args[18] = OscType::String(String::new());
        args[20] = OscType::Int(-1); // no follow
        args[21] = OscType::Int(500); // hang 0.5s
        args[26] = OscType::Int(2);
        args[28] = OscType::String("Act One".into());
        args[29] = OscType::Bool(true);

        let event = decode(&msg("/eos/out/get/cue/1/5/0/list/3/10", args)).unwrap();
        let ConsoleEvent::CueData(rec) = event else {
            panic!("expected cue data");
        };
        assert_eq!((rec.list, rec.number.as_str(), rec.part), (1, "5", 0));
        assert_eq!((rec.index, rec.total), (3, 10));
        assert_eq!(rec.update.label, "House out");
        assert!(rec.update.uid.is_some());
        assert_eq!(rec.update.up_time, Some(2.5));
        assert_eq!(rec.update.up_delay, None);
        assert_eq!(rec.update.down_time, Some(1.23));
        assert_eq!(rec.update.mark, "M");
        assert_eq!(rec.update.follow_time, None);
        assert_eq!(rec.update.hang_time, Some(0.5));
        assert_eq!(rec.update.part_count, 2);
        assert_eq!(rec.update.scene, "Act One");
        assert!(rec.update.scene_end);
        assert_eq!(rec.update.duration, 2.5);
    }

    #[test]
    fn decodes_cuelist_form_of_cue_data() {
        let event = decode(&msg("/eos/out/get/cuelist/2/cue/7.5/1/list/0/4", vec![])).unwrap();
        let ConsoleEvent::CueData(rec) = event else {
            panic!("expected cue data");
        };
        assert_eq!((rec.list, rec.number.as_str(), rec.part), (2, "7.5", 1));
        assert_eq!(rec.total, 4);
    }

    #[test]
    fn decodes_cue_notify() {
        assert_eq!(
            decode(&msg("/eos/out/notify/cue/1/list/0/3", vec![OscType::Float(5.0)])),
            Some(ConsoleEvent::CueNotify {
                list: 1,
                cue_number: Some("5".into()),
                count: 3
            })
        );
    }

    #[test]
    fn decodes_active_and_pending_shapes() {
        assert_eq!(
            decode(&msg("/eos/out/active/cue/1/5", vec![])),
            Some(ConsoleEvent::ActiveCue {
                list: 1,
                number: "5".into()
            })
        );
        assert_eq!(
            decode(&msg(
                "/eos/out/active/cue/text",
                vec![OscType::String("1/5 Look 3.0 100%".into())]
            )),
            Some(ConsoleEvent::ActiveCueText {
                list: None,
                text: "1/5 Look 3.0 100%".into()
            })
        );
        assert_eq!(
            decode(&msg(
                "/eos/out/pending/cue/2/text",
                vec![OscType::String("9 Next 5".into())]
            )),
            Some(ConsoleEvent::PendingCueText {
                list: Some(2),
                text: "9 Next 5".into()
            })
        );
        assert_eq!(
            decode(&msg("/eos/out/pending/cue/2/9.1", vec![])),
            Some(ConsoleEvent::PendingCue {
                list: 2,
                number: "9.1".into()
            })
        );
    }

    #[test]
    fn decodes_fader_config() {
        assert_eq!(
            decode(&msg(
                "/eos/out/get/fader/0/config",
                vec![
                    OscType::Int(1),
                    OscType::Int(3),
                    OscType::String("Main".into())
                ]
            )),
            Some(ConsoleEvent::FaderConfig {
                index: 0,
                fader_type: 1,
                target: 3,
                label: "Main".into()
            })
        );
    }

    #[test]
    fn unknown_addresses_are_ignored() {
        assert_eq!(decode(&msg("/eos/out/ping", vec![])), None);
        assert_eq!(decode(&msg("/other/thing", vec![])), None);
    }

    #[test]
    fn request_addresses() {
        assert_eq!(
            ConsoleRequest::CueCount { list: 7 }.to_message().addr,
            "/eos/get/cue/7/count"
        );
        assert_eq!(
            ConsoleRequest::CueIndex { list: 7, index: 12 }.to_message().addr,
            "/eos/get/cue/7/index/12"
        );
        assert_eq!(
            ConsoleRequest::CueListWildcard { list: 7 }.to_message().addr,
            "/eos/get/cuelist/7/cue/*/list"
        );
        let subscribe = ConsoleRequest::Subscribe.to_message();
        assert_eq!(subscribe.addr, "/eos/subscribe");
        assert_eq!(subscribe.args, vec![OscType::Int(1)]);
    }

    #[test]
    fn cue_text_full_form() {
        let CueTextOutcome::Parsed(parsed) = parse_cue_text("1/5 House out 3.0 75%") else {
            panic!("expected parse");
        };
        assert_eq!(parsed.list, Some(1));
        assert_eq!(parsed.number, "5");
        assert_eq!(parsed.label, "House out");
        assert_eq!(parsed.fade_time, Some(3.0));
        assert_eq!(parsed.percent, Some(75));
    }

    #[test]
    fn cue_text_shorter_forms() {
        // fade + pct, no label
        let CueTextOutcome::Parsed(p) = parse_cue_text("1/5 3.0 0%") else {
            panic!()
        };
        assert_eq!((p.label.as_str(), p.fade_time, p.percent), ("", Some(3.0), Some(0)));

        // label + fade, no pct
        let CueTextOutcome::Parsed(p) = parse_cue_text("2/9 Next look 5") else {
            panic!()
        };
        assert_eq!((p.label.as_str(), p.fade_time, p.percent), ("Next look", Some(5.0), None));

        // fade only
        let CueTextOutcome::Parsed(p) = parse_cue_text("2/9 5") else { panic!() };
        assert_eq!((p.label.as_str(), p.fade_time), ("", Some(5.0)));

        // whole remainder is the label
        let CueTextOutcome::Parsed(p) = parse_cue_text("2/9 Thunder and lightning") else {
            panic!()
        };
        assert_eq!(p.label, "Thunder and lightning");
        assert_eq!(p.fade_time, None);

        // bare cue number without list needs context
        let CueTextOutcome::Parsed(p) = parse_cue_text("9 Storm 2.5") else {
            panic!()
        };
        assert_eq!(p.list, None);
        assert_eq!(p.number, "9");
    }

    #[test]
    fn cue_text_reset_forms() {
        assert_eq!(parse_cue_text(""), CueTextOutcome::Reset);
        assert_eq!(parse_cue_text("   "), CueTextOutcome::Reset);
        assert_eq!(parse_cue_text("0.0 "), CueTextOutcome::Reset);
        assert_eq!(parse_cue_text("0/0 Nothing"), CueTextOutcome::Reset);
    }

    #[test]
    fn cue_text_parse_is_total() {
        for input in [
            "garbage",
            "1/",
            "/5",
            "1/5",
            "%%% %%",
            "5 ???? -3 -1%",
            "0.5 almost reset",
            "∞/☃ unicode",
        ] {
            // Must classify, never panic.
            let _ = parse_cue_text(input);
        }
    }
}
