//! ONVIF SOAP XML response templates
//!
//! Every response body is wrapped in one SOAP 1.2 envelope declaring the
//! device, media, schema and error namespaces.

use chrono::{Datelike, Timelike};
use quick_xml::escape::escape;

use crate::context::VideoParams;
use crate::fault::Fault;
use crate::time::ClockReading;

/// Escape a string for safe inclusion in XML content/attributes.
fn xml_escape(s: &str) -> String {
    escape(s).to_string()
}

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
            xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
            xmlns:tt="http://www.onvif.org/ver10/schema"
            xmlns:ter="http://www.onvif.org/ver10/error">
  <s:Body>
{}
  </s:Body>
</s:Envelope>"#,
        body
    )
}

/// SOAP fault response
pub fn fault(fault: &Fault) -> String {
    envelope(&format!(
        r#"    <s:Fault>
      <s:Code>
        <s:Value>{}</s:Value>
        <s:Subcode>
          <s:Value>{}</s:Value>
        </s:Subcode>
      </s:Code>
      <s:Reason>
        <s:Text xml:lang="en">{}</s:Text>
      </s:Reason>
    </s:Fault>"#,
        fault.code.value(),
        fault.code.subcode(),
        xml_escape(&fault.reason)
    ))
}

pub struct DeviceInfo<'a> {
    pub model: &'a str,
    pub serial: &'a str,
    pub hardware_id: &'a str,
}

pub fn device_information(info: &DeviceInfo<'_>) -> String {
    envelope(&format!(
        r#"    <tds:GetDeviceInformationResponse>
      <tds:Manufacturer>ONVIF Proxy</tds:Manufacturer>
      <tds:Model>{}</tds:Model>
      <tds:FirmwareVersion>1.0.0</tds:FirmwareVersion>
      <tds:SerialNumber>{}</tds:SerialNumber>
      <tds:HardwareId>{}</tds:HardwareId>
    </tds:GetDeviceInformationResponse>"#,
        xml_escape(info.model),
        xml_escape(info.serial),
        xml_escape(info.hardware_id)
    ))
}

pub fn device_capability(xaddr: &str) -> String {
    format!(
        r#"        <tt:Device>
          <tt:XAddr>{}</tt:XAddr>
        </tt:Device>"#,
        xml_escape(xaddr)
    )
}

pub fn media_capability(xaddr: &str, profile_count: usize) -> String {
    format!(
        r#"        <tt:Media>
          <tt:XAddr>{}</tt:XAddr>
          <tt:StreamingCapabilities>
            <tt:RTPMulticast>false</tt:RTPMulticast>
            <tt:RTP_TCP>true</tt:RTP_TCP>
            <tt:RTP_RTSP_TCP>true</tt:RTP_RTSP_TCP>
          </tt:StreamingCapabilities>
          <tt:Extension>
            <tt:ProfileCapabilities>
              <tt:MaximumNumberOfProfiles>{}</tt:MaximumNumberOfProfiles>
            </tt:ProfileCapabilities>
          </tt:Extension>
        </tt:Media>"#,
        xml_escape(xaddr),
        profile_count
    )
}

/// `blocks` are pre-rendered capability categories
pub fn capabilities(blocks: &[String]) -> String {
    envelope(&format!(
        r#"    <tds:GetCapabilitiesResponse>
      <tds:Capabilities>
{}
      </tds:Capabilities>
    </tds:GetCapabilitiesResponse>"#,
        blocks.join("\n")
    ))
}

/// GetServices response for the device and media services
pub fn services(device_xaddr: &str, media_xaddr: &str) -> String {
    let entry = |namespace: &str, xaddr: &str| {
        format!(
            r#"      <tds:Service>
        <tds:Namespace>{}</tds:Namespace>
        <tds:XAddr>{}</tds:XAddr>
        <tds:Version><tt:Major>2</tt:Major><tt:Minor>5</tt:Minor></tds:Version>
      </tds:Service>"#,
            namespace,
            xml_escape(xaddr)
        )
    };
    envelope(&format!(
        "    <tds:GetServicesResponse>\n{}\n{}\n    </tds:GetServicesResponse>",
        entry("http://www.onvif.org/ver10/device/wsdl", device_xaddr),
        entry("http://www.onvif.org/ver10/media/wsdl", media_xaddr)
    ))
}

pub struct ProfileEntry<'a> {
    pub token: &'a str,
    pub name: &'a str,
    pub encoder_token: &'a str,
    pub encoder_name: &'a str,
    pub quality: u32,
    pub source_token: &'a str,
    /// Bounds always follow the source (main stream) resolution
    pub source: VideoParams,
    pub encoder: VideoParams,
}

pub fn profile(p: &ProfileEntry<'_>) -> String {
    format!(
        r#"    <trt:Profiles token="{token}" fixed="true">
      <tt:Name>{name}</tt:Name>
      <tt:VideoSourceConfiguration token="video_src_config_token">
        <tt:Name>VideoSource</tt:Name>
        <tt:UseCount>2</tt:UseCount>
        <tt:SourceToken>{source_token}</tt:SourceToken>
        <tt:Bounds x="0" y="0" width="{src_w}" height="{src_h}"/>
      </tt:VideoSourceConfiguration>
      <tt:VideoEncoderConfiguration token="{enc_token}">
        <tt:Name>{enc_name}</tt:Name>
        <tt:UseCount>1</tt:UseCount>
        <tt:Encoding>H264</tt:Encoding>
        <tt:Resolution>
          <tt:Width>{w}</tt:Width>
          <tt:Height>{h}</tt:Height>
        </tt:Resolution>
        <tt:Quality>{quality}</tt:Quality>
        <tt:RateControl>
          <tt:FrameRateLimit>{fps}</tt:FrameRateLimit>
          <tt:EncodingInterval>1</tt:EncodingInterval>
          <tt:BitrateLimit>{bitrate}</tt:BitrateLimit>
        </tt:RateControl>
        <tt:H264>
          <tt:GovLength>{fps}</tt:GovLength>
          <tt:H264Profile>Main</tt:H264Profile>
        </tt:H264>
        <tt:SessionTimeout>PT1000S</tt:SessionTimeout>
      </tt:VideoEncoderConfiguration>
    </trt:Profiles>"#,
        token = xml_escape(p.token),
        name = xml_escape(p.name),
        source_token = xml_escape(p.source_token),
        src_w = p.source.width,
        src_h = p.source.height,
        enc_token = xml_escape(p.encoder_token),
        enc_name = xml_escape(p.encoder_name),
        w = p.encoder.width,
        h = p.encoder.height,
        quality = p.quality,
        fps = p.encoder.framerate,
        bitrate = p.encoder.bitrate,
    )
}

pub fn profiles(entries: &[String]) -> String {
    envelope(&format!(
        "    <trt:GetProfilesResponse>\n{}\n    </trt:GetProfilesResponse>",
        entries.join("\n")
    ))
}

pub fn video_sources(token: &str, source: &VideoParams) -> String {
    envelope(&format!(
        r#"    <trt:GetVideoSourcesResponse>
      <trt:VideoSources token="{}">
        <tt:Framerate>{}</tt:Framerate>
        <tt:Resolution>
          <tt:Width>{}</tt:Width>
          <tt:Height>{}</tt:Height>
        </tt:Resolution>
      </trt:VideoSources>
    </trt:GetVideoSourcesResponse>"#,
        xml_escape(token),
        source.framerate,
        source.width,
        source.height
    ))
}

/// GetStreamUri / GetSnapshotUri response; `operation` is the request name
pub fn media_uri(operation: &str, uri: &str) -> String {
    envelope(&format!(
        r#"    <trt:{op}Response>
      <trt:MediaUri>
        <tt:Uri>{uri}</tt:Uri>
        <tt:InvalidAfterConnect>false</tt:InvalidAfterConnect>
        <tt:InvalidAfterReboot>false</tt:InvalidAfterReboot>
        <tt:Timeout>PT30S</tt:Timeout>
      </trt:MediaUri>
    </trt:{op}Response>"#,
        op = operation,
        uri = xml_escape(uri)
    ))
}

fn date_time<T: Datelike + Timelike>(tag: &str, t: &T) -> String {
    format!(
        r#"        <tt:{tag}>
          <tt:Time>
            <tt:Hour>{}</tt:Hour>
            <tt:Minute>{}</tt:Minute>
            <tt:Second>{}</tt:Second>
          </tt:Time>
          <tt:Date>
            <tt:Year>{}</tt:Year>
            <tt:Month>{}</tt:Month>
            <tt:Day>{}</tt:Day>
          </tt:Date>
        </tt:{tag}>"#,
        t.hour(),
        t.minute(),
        t.second(),
        t.year(),
        t.month(),
        t.day(),
        tag = tag
    )
}

pub fn system_date_and_time(clock: &ClockReading) -> String {
    envelope(&format!(
        r#"    <tds:GetSystemDateAndTimeResponse>
      <tds:SystemDateAndTime>
        <tt:DateTimeType>NTP</tt:DateTimeType>
        <tt:DaylightSavings>{}</tt:DaylightSavings>
        <tt:TimeZone>
          <tt:TZ>{}</tt:TZ>
        </tt:TimeZone>
{}
{}
      </tds:SystemDateAndTime>
    </tds:GetSystemDateAndTimeResponse>"#,
        clock.daylight_savings,
        xml_escape(&clock.tz),
        date_time("UTCDateTime", &clock.utc),
        date_time("LocalDateTime", &clock.local)
    ))
}
