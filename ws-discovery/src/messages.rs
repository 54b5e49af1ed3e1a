//! Probe / ProbeMatch envelopes

use std::net::SocketAddr;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

pub const NVT_TYPE: &str = "NetworkVideoTransmitter";

/// Inbound Probe
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    pub message_id: String,
    /// `d:Types`, absent means "any type"
    pub types: Option<String>,
}

impl Probe {
    /// True when the type filter is absent or names NetworkVideoTransmitter
    pub fn wants_video_transmitter(&self) -> bool {
        match self.types.as_deref() {
            None => true,
            Some(t) if t.trim().is_empty() => true,
            Some(t) => t.contains(NVT_TYPE),
        }
    }
}

/// What a responding camera advertises about itself
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceIdentity {
    /// Bare UUID, without `urn:uuid:`
    pub uuid: String,
    /// Device service URL advertised as XAddr
    pub xaddr: String,
    /// Display name, used for the scopes
    pub name: String,
}

impl DeviceIdentity {
    pub fn scopes(&self) -> String {
        let name = self.name.trim().replace(' ', "%20");
        let name = if name.is_empty() { "VirtualCamera".to_string() } else { name };
        format!(
            "onvif://www.onvif.org/hardware/{} onvif://www.onvif.org/name/{}",
            name, name
        )
    }
}

/// A device found by an active scan
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub uuid: String,
    pub xaddrs: Vec<String>,
    pub scopes: Option<String>,
    pub source: SocketAddr,
}

impl DiscoveredDevice {
    /// First advertised service address
    pub fn primary_xaddr(&self) -> Option<&str> {
        self.xaddrs.first().map(String::as_str)
    }
}

pub fn build_probe(message_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<e:Envelope xmlns:e="http://www.w3.org/2003/05/soap-envelope" xmlns:w="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery" xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
<e:Header><w:MessageID>{}</w:MessageID><w:To e:mustUnderstand="true">urn:schemas-xmlsoap-org:ws:2005:04:discovery</w:To><w:Action e:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe</w:Action></e:Header>
<e:Body><d:Probe><d:Types>dn:NetworkVideoTransmitter</d:Types></d:Probe></e:Body>
</e:Envelope>"#,
        escape(message_id)
    )
}

pub fn build_probe_match(
    identity: &DeviceIdentity,
    relates_to: &str,
    message_number: u64,
    instance_id: u64,
) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope" xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing" xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery" xmlns:dn="http://www.onvif.org/ver10/network/wsdl">
<SOAP-ENV:Header>
<wsa:MessageID>urn:uuid:{message_id}</wsa:MessageID>
<wsa:RelatesTo>{relates_to}</wsa:RelatesTo>
<wsa:To SOAP-ENV:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous</wsa:To>
<wsa:Action SOAP-ENV:mustUnderstand="true">http://schemas.xmlsoap.org/ws/2005/04/discovery/ProbeMatches</wsa:Action>
<d:AppSequence SOAP-ENV:mustUnderstand="true" MessageNumber="{message_number}" InstanceId="{instance_id}"/>
</SOAP-ENV:Header>
<SOAP-ENV:Body>
<d:ProbeMatches>
<d:ProbeMatch>
<wsa:EndpointReference><wsa:Address>urn:uuid:{uuid}</wsa:Address></wsa:EndpointReference>
<d:Types>dn:NetworkVideoTransmitter</d:Types>
<d:Scopes>{scopes}</d:Scopes>
<d:XAddrs>{xaddr}</d:XAddrs>
<d:MetadataVersion>1</d:MetadataVersion>
</d:ProbeMatch>
</d:ProbeMatches>
</SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#,
        message_id = uuid::Uuid::new_v4(),
        relates_to = escape(relates_to),
        message_number = message_number,
        instance_id = instance_id,
        uuid = escape(&identity.uuid),
        scopes = escape(&identity.scopes()),
        xaddr = escape(&identity.xaddr),
    )
}

/// Collect the text of elements addressed by local-name paths.
///
/// Each entry of `wanted` is a suffix of the element path, e.g.
/// `["Header", "MessageID"]`. Returns the first text seen for each.
fn collect_texts<const N: usize>(xml: &str, wanted: [&[&str]; N]) -> Option<[Option<String>; N]> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut found: [Option<String>; N] = std::array::from_fn(|_| None);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(t)) => {
                for (i, suffix) in wanted.iter().enumerate() {
                    if found[i].is_none() && ends_with(&path, suffix) {
                        found[i] = Some(t.unescape().ok()?.trim().to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
    }
    Some(found)
}

fn ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

fn has_element(xml: &str, parent: &str, local: &str) -> bool {
    let mut reader = Reader::from_str(xml);
    let mut last: Option<Vec<u8>> = None;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == local.as_bytes() && last.as_deref() == Some(parent.as_bytes()) {
                    return true;
                }
                last = Some(name);
            }
            Ok(Event::Eof) | Err(_) => return false,
            _ => {}
        }
    }
}

/// Parse a Probe. Non-probe messages (Hello, Bye, ProbeMatches) and probes
/// without a MessageID yield `None`.
pub fn parse_probe(xml: &str) -> Option<Probe> {
    if !has_element(xml, "Body", "Probe") {
        return None;
    }
    let [message_id, types] = collect_texts(
        xml,
        [&["Header", "MessageID"][..], &["Body", "Probe", "Types"][..]],
    )?;
    Some(Probe {
        message_id: message_id.filter(|m| !m.is_empty())?,
        types,
    })
}

/// Parse the first ProbeMatch of a ProbeMatches message.
///
/// The UUID is taken from `urn:uuid:` in the endpoint address, else the whole
/// address is used.
pub fn parse_probe_match(xml: &str, source: SocketAddr) -> Option<DiscoveredDevice> {
    let [address, xaddrs, scopes] = collect_texts(
        xml,
        [
            &["ProbeMatch", "EndpointReference", "Address"][..],
            &["ProbeMatch", "XAddrs"][..],
            &["ProbeMatch", "Scopes"][..],
        ],
    )?;
    let address = address.filter(|a| !a.is_empty())?;
    let uuid = match address.find("urn:uuid:") {
        Some(i) => address[i + "urn:uuid:".len()..].to_string(),
        None => address,
    };
    Some(DiscoveredDevice {
        uuid,
        xaddrs: xaddrs
            .map(|x| x.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        scopes,
        source,
    })
}
