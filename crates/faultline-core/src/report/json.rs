//! JSON report output.
//!
//! Hand-written rather than derived: the serializer runs inside the signal
//! handler and has to stream straight into the file sink without building a
//! document in memory.
//!
//! ```json
//! {"metadata":{"app":{"version":"1.2.0"}},
//!  "exception":{"errorClass":"Native Error: SIGSEGV",
//!               "message":"Fatal signal from native: 11 (SIGSEGV), code 1",
//!               "signal":11,"code":1,"faultAddress":"0x0000000000000000",
//!               "unwinder":"stack-scan","framesUsed":1,
//!               "stacktrace":[{"file":"/data/app/lib/libgame.so","method":"crash_now",...}]},
//!  "storageDirectory":"/data/crashes","timestamp":1700000000}
//! ```

use std::fmt::{self, Write};

use super::ReportSerializer;
use crate::symbols::{write_demangled, SymbolLanguage};
use crate::types::{Address, CrashReport, ReportMetadata, StackFrame};

/// Reference [`ReportSerializer`] producing one compact JSON object per report.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl ReportSerializer for JsonSerializer
{
    fn extension(&self) -> &'static str
    {
        "json"
    }

    fn serialize(&self, report: &CrashReport, sink: &mut dyn fmt::Write) -> fmt::Result
    {
        sink.write_str("{\"metadata\":")?;
        write_metadata(report.metadata(), sink)?;

        let fault = report.fault();
        sink.write_str(",\"exception\":{\"errorClass\":")?;
        write_string(sink, report.error_class())?;
        sink.write_str(",\"message\":")?;
        write_string(sink, report.message())?;
        write!(
            sink,
            ",\"signal\":{},\"code\":{},\"faultAddress\":\"{}\",\"unwinder\":\"{}\",\"framesUsed\":{}",
            fault.signal,
            fault.code,
            Address::new(fault.fault_address),
            report.unwinder(),
            report.frames_used()
        )?;

        sink.write_str(",\"stacktrace\":[")?;
        for (index, frame) in report.stack_trace().iter().enumerate() {
            if index > 0 {
                sink.write_char(',')?;
            }
            write_frame(frame, sink)?;
        }
        sink.write_str("]}")?;

        sink.write_str(",\"storageDirectory\":")?;
        write_string(sink, report.storage_dir().to_str().unwrap_or_default())?;
        write!(sink, ",\"timestamp\":{}}}", report.timestamp())?;
        sink.write_char('\n')
    }
}

fn write_frame(frame: &StackFrame, sink: &mut dyn fmt::Write) -> fmt::Result
{
    sink.write_str("{\"file\":")?;
    write_string(sink, frame.file.as_str())?;
    sink.write_str(",\"method\":")?;
    write_string(sink, frame.method.as_str())?;

    if SymbolLanguage::detect(frame.method.as_str()) == SymbolLanguage::Rust {
        sink.write_str(",\"demangledMethod\":\"")?;
        if let Some(result) = write_demangled(frame.method.as_str(), &mut Escaped(&mut *sink)) {
            result?;
        }
        sink.write_char('"')?;
    }

    write!(
        sink,
        ",\"frameAddress\":\"{}\",\"fileAddress\":\"{}\",\"fileOffset\":{}",
        frame.frame_address, frame.file_address, frame.file_offset
    )?;
    match (frame.method_address, frame.method_offset) {
        (Some(address), Some(offset)) => write!(sink, ",\"methodAddress\":\"{address}\",\"methodOffset\":{offset}")?,
        _ => sink.write_str(",\"methodAddress\":null,\"methodOffset\":null")?,
    }
    write!(sink, ",\"inProject\":{}}}", frame.in_project)
}

/// Sections become nested objects, in order of first appearance.
fn write_metadata(metadata: &ReportMetadata, sink: &mut dyn fmt::Write) -> fmt::Result
{
    let entries = metadata.entries();
    sink.write_char('{')?;
    let mut first_section = true;
    for (index, entry) in entries.iter().enumerate() {
        if entries[..index].iter().any(|earlier| earlier.section == entry.section) {
            continue;
        }
        if !first_section {
            sink.write_char(',')?;
        }
        first_section = false;

        write_string(sink, &entry.section)?;
        sink.write_str(":{")?;
        let mut first_key = true;
        for member in entries[index..].iter().filter(|member| member.section == entry.section) {
            if !first_key {
                sink.write_char(',')?;
            }
            first_key = false;
            write_string(sink, &member.key)?;
            sink.write_char(':')?;
            write_string(sink, &member.value)?;
        }
        sink.write_char('}')?;
    }
    sink.write_char('}')
}

fn write_string(sink: &mut dyn fmt::Write, value: &str) -> fmt::Result
{
    sink.write_char('"')?;
    Escaped(&mut *sink).write_str(value)?;
    sink.write_char('"')
}

/// Writer adapter applying JSON string escaping.
struct Escaped<'a>(&'a mut dyn fmt::Write);

impl fmt::Write for Escaped<'_>
{
    fn write_str(&mut self, value: &str) -> fmt::Result
    {
        let mut start = 0;
        for (index, ch) in value.char_indices() {
            let escape = match ch {
                '"' => Some("\\\""),
                '\\' => Some("\\\\"),
                '\n' => Some("\\n"),
                '\r' => Some("\\r"),
                '\t' => Some("\\t"),
                c if (c as u32) < 0x20 => None,
                _ => continue,
            };
            self.0.write_str(&value[start..index])?;
            match escape {
                Some(text) => self.0.write_str(text)?,
                None => write!(self.0, "\\u{:04x}", ch as u32)?,
            }
            start = index + ch.len_utf8();
        }
        self.0.write_str(&value[start..])
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn escape(value: &str) -> String
    {
        let mut out = String::new();
        write_string(&mut out, value).unwrap();
        out
    }

    #[test]
    fn test_escapes_quotes_and_controls()
    {
        assert_eq!(escape("plain"), "\"plain\"");
        assert_eq!(escape("say \"hi\"\\"), "\"say \\\"hi\\\"\\\\\"");
        assert_eq!(escape("a\nb\tc\u{1}"), "\"a\\nb\\tc\\u0001\"");
        assert_eq!(escape("päth/€"), "\"päth/€\"");
    }

    #[test]
    fn test_metadata_groups_sections_in_first_seen_order()
    {
        let metadata = ReportMetadata::new()
            .with("app", "version", "1.2.0")
            .with("device", "model", "Pixel")
            .with("app", "releaseStage", "production");
        let mut out = String::new();
        write_metadata(&metadata, &mut out).unwrap();
        assert_eq!(
            out,
            "{\"app\":{\"version\":\"1.2.0\",\"releaseStage\":\"production\"},\"device\":{\"model\":\"Pixel\"}}"
        );
    }

    #[test]
    fn test_empty_report_is_well_formed()
    {
        let report = CrashReport::with_frame_capacity("/tmp/crashes", ReportMetadata::new(), 4);
        let mut out = String::new();
        JsonSerializer.serialize(&report, &mut out).unwrap();
        assert!(out.starts_with("{\"metadata\":{},\"exception\":{\"errorClass\":\"\""));
        assert!(out.contains("\"stacktrace\":[]"));
        assert!(out.ends_with("\"storageDirectory\":\"/tmp/crashes\",\"timestamp\":0}\n"));
    }

    #[test]
    fn test_rust_methods_get_demangled_field()
    {
        let mut frame = StackFrame::default();
        frame.method.set("_ZN4core9panicking5panic17h0123456789abcdefE");
        let mut out = String::new();
        write_frame(&frame, &mut out).unwrap();
        assert!(out.contains("\"demangledMethod\":\"core::panicking::panic\""));

        frame.method.set("crash_now");
        let mut out = String::new();
        write_frame(&frame, &mut out).unwrap();
        assert!(!out.contains("demangledMethod"));
        assert!(out.contains("\"methodAddress\":null"));
    }
}
