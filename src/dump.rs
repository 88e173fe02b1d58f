//! Format decoded values for display. Templates and transforms are display-only;
//! stored values are never touched.
//!
//! Templates use a small `{}`-style syntax: `{}`, `{:x}`, `{:08x}`, `{:>11s}`, `{:2}`.
//! Fill is `0` or space, alignment `<`/`>`, then width, then a type of `x`, `X`, `d` or `s`.

use crate::dt::{self, RtcTime};
use crate::registry::lookup_type_name;
use crate::schema::{Format, MemberKind, Schema, Transform};
use crate::stream::{Fault, Record};
use crate::value::{Fields, Value};

/// Lower-case hex, no separators (hexlify).
pub fn hexlify(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect()
}

/// Space separated hex, for raw dumps of faulted records.
pub fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

/// Seconds.microseconds since the top of the hour, e.g. `"150.500000"`.
pub fn rtctime_str(rt: &RtcTime) -> String {
    let (secs, micros) = rt.basic();
    format!("{}.{:06}", secs, micros)
}

#[derive(Debug, Default)]
struct Spec {
    align: Option<char>,
    zero: bool,
    width: usize,
    ty: Option<char>,
}

fn parse_spec(s: &str) -> Spec {
    let mut spec = Spec::default();
    let mut rest = s.strip_prefix(':').unwrap_or(s);
    if let Some(c @ ('<' | '>')) = rest.chars().next() {
        spec.align = Some(c);
        rest = &rest[1..];
    }
    if let Some(r) = rest.strip_prefix('0') {
        spec.zero = true;
        rest = r;
    }
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    spec.width = digits.parse().unwrap_or(0);
    spec.ty = rest[digits.len()..].chars().next();
    spec
}

fn pad(s: String, spec: &Spec, numeric: bool) -> String {
    if s.len() >= spec.width {
        return s;
    }
    let fill = spec.width - s.len();
    // Numbers right-align and strings left-align unless told otherwise.
    let right = match spec.align {
        Some('<') => false,
        Some('>') => true,
        _ => numeric,
    };
    if spec.zero && numeric {
        format!("{}{}", "0".repeat(fill), s)
    } else if right {
        format!("{}{}", " ".repeat(fill), s)
    } else {
        format!("{}{}", s, " ".repeat(fill))
    }
}

fn fmt_one(spec: &Spec, arg: &Arg) -> String {
    match arg {
        Arg::Unsigned(n) => {
            let s = match spec.ty {
                Some('x') => format!("{:x}", n),
                Some('X') => format!("{:X}", n),
                _ => n.to_string(),
            };
            pad(s, spec, true)
        }
        Arg::Signed(n) => {
            let s = match spec.ty {
                Some('x') => format!("{:x}", n),
                Some('X') => format!("{:X}", n),
                _ => n.to_string(),
            };
            pad(s, spec, true)
        }
        Arg::Text(t) => pad(t.clone(), spec, false),
    }
}

enum Arg {
    Unsigned(u64),
    Signed(i64),
    Text(String),
}

fn text_of(b: &[u8]) -> String {
    let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
    String::from_utf8_lossy(&b[..end]).into_owned()
}

fn args_for(v: &Value, transform: Option<Transform>) -> Vec<Arg> {
    if let Some(Transform::Hexlify) = transform {
        if let Some(b) = v.as_bytes() {
            return vec![Arg::Text(hexlify(b))];
        }
    }
    match v {
        Value::U8(_) | Value::U16(_) | Value::U32(_) => vec![Arg::Unsigned(v.as_u64().unwrap_or(0))],
        Value::I8(_) | Value::I16(_) | Value::I32(_) => vec![Arg::Signed(v.as_i64().unwrap_or(0))],
        Value::Bytes(b) => vec![Arg::Text(text_of(b))],
        Value::Pair(a, b) => vec![Arg::Text(a.clone()), Arg::Text(b.clone())],
        Value::Struct(_) | Value::List(_) => vec![Arg::Text(format!("{:?}", v))],
    }
}

/// Fill a template's placeholders from `args` in order. Missing args render empty.
fn fill(template: &str, args: &[Arg]) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut next = 0usize;
    let mut chars = template.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                out.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let close = template[i..].find('}').map(|j| i + j);
                match close {
                    Some(end) => {
                        let spec = parse_spec(&template[i + 1..end]);
                        if let Some(a) = args.get(next) {
                            out.push_str(&fmt_one(&spec, a));
                        }
                        next += 1;
                        while matches!(chars.peek(), Some((j, _)) if *j <= end) {
                            chars.next();
                        }
                    }
                    None => out.push(c),
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Render a value with its field's display format.
pub fn render(format: &Format, v: &Value) -> String {
    fill(format.template, &args_for(v, format.transform))
}

/// Multi-line dump of a structure instance, using `schema` for per-field formats.
/// Members are listed in on-wire order.
pub fn fields_to_dump(schema: &Schema, fields: &Fields, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    let mut lines = Vec::new();
    for (name, v) in fields.iter() {
        let member = schema.member(name);
        match (member.map(|m| m.kind), v) {
            (Some(MemberKind::Nested(sub)), Value::Struct(f)) => {
                lines.push(format!("{}{}:", pad, name));
                lines.push(fields_to_dump(sub, f, indent + 1));
            }
            (Some(MemberKind::Atom(a)), _) => lines.push(format!("{}{}: {}", pad, name, render(&a.format, v))),
            (Some(MemberKind::Var(_, f)), _) => lines.push(format!("{}{}: {}", pad, name, render(&f, v))),
            _ => lines.push(format!("{}{}: {}", pad, name, value_to_dump(v, indent))),
        }
    }
    lines.join("\n")
}

/// Schema-less dump, for values added by decoders outside a schema (lists, extra parts).
pub fn value_to_dump(v: &Value, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    match v {
        Value::U8(_) | Value::U16(_) | Value::U32(_) => format!("{}", v.as_u64().unwrap_or(0)),
        Value::I8(_) | Value::I16(_) | Value::I32(_) => format!("{}", v.as_i64().unwrap_or(0)),
        Value::Bytes(b) => format!("hex({})", hex_string(b)),
        Value::Pair(a, b) => format!("<{}> <{}>", a, b),
        Value::Struct(m) => {
            let mut lines: Vec<String> = vec!["{".to_string()];
            for (k, val) in m.iter() {
                lines.push(format!("{}  {}: {}", pad, k, value_to_dump(val, indent + 1)));
            }
            lines.push(format!("{}}}", pad));
            lines.join("\n")
        }
        Value::List(lst) if lst.is_empty() => "[]".to_string(),
        Value::List(lst) => {
            let mut lines: Vec<String> = vec!["[".to_string()];
            for (i, item) in lst.iter().enumerate() {
                lines.push(format!("{}  [{}] {}", pad, i, value_to_dump(item, indent + 1)));
            }
            lines.push(format!("{}]", pad));
            lines.join("\n")
        }
    }
}

/// Column title matching [`record_line`].
pub const REC_TITLE: &str = "---  offset    recnum    rtime    len  dt  name";

/// One-line identity of a decoded record: offset, recnum, rtctime, len, type, name.
pub fn record_line(r: &Record) -> String {
    let mut line = format!(
        "--- @{:<8} {:7} {:>11} {:3}  {:2}  {}",
        r.offset,
        r.header.recnum,
        rtctime_str(&r.header.rt),
        r.header.len,
        r.header.rtype,
        r.name
    );
    if let Some(detail) = record_detail(r) {
        line.push_str("  ");
        line.push_str(&detail);
    }
    line
}

/// Type-specific one-line detail: event names, image versions, GPS message names.
pub fn record_detail(r: &Record) -> Option<String> {
    match r.header.rtype {
        dt::DT_EVENT => {
            let event = r.fields.u64("event")? as u16;
            let arg0 = r.fields.u64("arg0").unwrap_or(0);
            if event == dt::EV_GPS_CMD {
                Some(format!("{} {}", dt::event_name(event), dt::gps_cmd_name(arg0 as u32)))
            } else {
                Some(dt::event_name(event).to_string())
            }
        }
        dt::DT_VERSION => {
            let v = r.fields.sub("image_info")?.sub("ver_id")?;
            Some(format!("{}.{}.{}", v.u64("major")?, v.u64("minor")?, v.u64("build")?))
        }
        dt::DT_GPS_VERSION => {
            let (a, b) = r.fields.get("sirf_swver")?.as_pair()?;
            Some(format!("--<{}>--  --<{}>--", a, b))
        }
        dt::DT_GPS_RAW_SIRFBIN => r.inner.as_ref().map(|m| match m.sid {
            Some(sid) => format!("{} ({}/{})", m.name, m.mid, sid),
            None => format!("{} ({})", m.name, m.mid),
        }),
        dt::DT_NOTE => r.fields.get("note").and_then(Value::as_bytes).map(text_of),
        _ => None,
    }
}

/// Line for records that could not be decoded normally.
pub fn fault_line(f: &Fault) -> String {
    match &f.header {
        Some(h) => format!(
            "@{:<8} {:7} {:>11} {:<3}  {:2}  {:12} @{} (0x{:06x}) [0x{:04x}]  *** {}",
            f.offset,
            h.recnum,
            rtctime_str(&h.rt),
            h.len,
            h.rtype,
            lookup_type_name(h.rtype),
            f.offset,
            f.offset,
            h.recsum,
            f.kind
        ),
        None => format!("@{:<8} *** {}  {}", f.offset, f.kind, hex_string(&f.raw)),
    }
}
