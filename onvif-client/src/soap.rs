//! SOAP 1.2 envelopes and response parsing

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Wrap `body` in an envelope. `security` is an optional `<wsse:Security>` element.
pub fn envelope(body: &str, security: Option<&str>) -> String {
    let header = security
        .map(|s| format!("<s:Header>{}</s:Header>", s))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
            xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema">{}<s:Body>{}</s:Body></s:Envelope>"#,
        header, body
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoapFault {
    /// Most specific code: the innermost Subcode value, else the Code value
    pub code: String,
    pub reason: String,
}

impl SoapFault {
    pub fn is_not_authorized(&self) -> bool {
        let reason = self.reason.to_ascii_lowercase();
        self.code.contains("NotAuthorized")
            || reason.contains("not authorized")
            || reason.contains("could not be authenticated")
    }
}

/// Parse `Body/Fault`, if the document has one.
pub fn parse_fault(xml: &str) -> Option<SoapFault> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut in_fault = false;
    let mut code = None;
    let mut reason = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"Fault" {
                    in_fault = true;
                }
                stack.push(e.local_name().as_ref().to_vec());
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(t)) if in_fault => {
                let text = t.unescape().ok()?.trim().to_string();
                match stack.last().map(Vec::as_slice) {
                    // Later (deeper) Value elements overwrite the outer Code value
                    Some(b"Value") => code = Some(text),
                    Some(b"Text") => reason = Some(text),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    in_fault.then(|| SoapFault {
        code: code.unwrap_or_default(),
        reason: reason.unwrap_or_default(),
    })
}

/// Text of the first element whose local name is `tag`
pub fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut inside = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == tag.as_bytes() => inside = true,
            Ok(Event::Text(t)) if inside => return t.unescape().ok().map(|s| s.into_owned()),
            Ok(Event::End(_)) if inside => return Some(String::new()),
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// `UTCDateTime` from a GetSystemDateAndTime response
pub fn parse_device_time(xml: &str) -> Option<DateTime<Utc>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_utc = false;
    let mut current: Option<Vec<u8>> = None;
    let mut fields = [None::<u32>; 6];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"UTCDateTime" {
                    in_utc = true;
                }
                current = Some(name);
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"UTCDateTime" {
                    break;
                }
                current = None;
            }
            Ok(Event::Text(t)) if in_utc => {
                let idx = match current.as_deref() {
                    Some(b"Year") => 0,
                    Some(b"Month") => 1,
                    Some(b"Day") => 2,
                    Some(b"Hour") => 3,
                    Some(b"Minute") => 4,
                    Some(b"Second") => 5,
                    _ => continue,
                };
                fields[idx] = t.unescape().ok()?.trim().parse().ok();
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    let [Some(year), Some(month), Some(day), Some(hour), Some(minute), Some(second)] = fields else {
        return None;
    };
    let naive = NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_opt(hour, minute, second)?;
    Some(Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_not_authorized_fault() {
        let xml = r#"<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope" xmlns:ter="http://www.onvif.org/ver10/error">
<env:Body><env:Fault>
  <env:Code><env:Value>env:Sender</env:Value>
    <env:Subcode><env:Value>ter:NotAuthorized</env:Value></env:Subcode>
  </env:Code>
  <env:Reason><env:Text xml:lang="en">Sender not Authorized</env:Text></env:Reason>
</env:Fault></env:Body></env:Envelope>"#;
        let fault = parse_fault(xml).unwrap();
        assert_eq!(fault.code, "ter:NotAuthorized");
        assert_eq!(fault.reason, "Sender not Authorized");
        assert!(fault.is_not_authorized());
    }

    #[test]
    fn test_no_fault() {
        let xml = r#"<s:Envelope xmlns:s="x"><s:Body><GetProfilesResponse/></s:Body></s:Envelope>"#;
        assert!(parse_fault(xml).is_none());
    }

    #[test]
    fn test_extract_value_ignores_prefix() {
        let xml = r#"<a:Envelope xmlns:a="x" xmlns:tt="y"><a:Body><trt:GetStreamUriResponse xmlns:trt="z"><trt:MediaUri><tt:Uri>rtsp://10.0.0.2/ch1?a=1&amp;b=2</tt:Uri></trt:MediaUri></trt:GetStreamUriResponse></a:Body></a:Envelope>"#;
        assert_eq!(
            extract_xml_value(xml, "Uri").as_deref(),
            Some("rtsp://10.0.0.2/ch1?a=1&b=2")
        );
        assert_eq!(extract_xml_value(xml, "Missing"), None);
    }

    #[test]
    fn test_parse_device_time() {
        let xml = r#"<s:Envelope xmlns:s="x" xmlns:tt="y"><s:Body><tds:GetSystemDateAndTimeResponse xmlns:tds="z"><tds:SystemDateAndTime>
<tt:DateTimeType>NTP</tt:DateTimeType>
<tt:UTCDateTime><tt:Time><tt:Hour>7</tt:Hour><tt:Minute>50</tt:Minute><tt:Second>45</tt:Second></tt:Time>
<tt:Date><tt:Year>2010</tt:Year><tt:Month>9</tt:Month><tt:Day>16</tt:Day></tt:Date></tt:UTCDateTime>
<tt:LocalDateTime><tt:Time><tt:Hour>9</tt:Hour><tt:Minute>50</tt:Minute><tt:Second>45</tt:Second></tt:Time>
<tt:Date><tt:Year>2011</tt:Year><tt:Month>9</tt:Month><tt:Day>16</tt:Day></tt:Date></tt:LocalDateTime>
</tds:SystemDateAndTime></tds:GetSystemDateAndTimeResponse></s:Body></s:Envelope>"#;
        let time = parse_device_time(xml).unwrap();
        assert_eq!(time.to_rfc3339(), "2010-09-16T07:50:45+00:00");
        assert_eq!(time.year(), 2010);
    }

    #[test]
    fn test_envelope_with_header() {
        let env = envelope("<trt:GetProfiles/>", Some("<wsse:Security/>"));
        assert!(env.contains("<s:Header><wsse:Security/></s:Header>"));
        assert!(!envelope("<x/>", None).contains("Header"));
    }
}
