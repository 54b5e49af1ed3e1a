use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One media profile as reported by GetProfiles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaProfile {
    pub token: String,
    pub name: Option<String>,
    pub video_source_token: Option<String>,
    /// `VideoSourceConfiguration/Name`
    pub video_source_name: Option<String>,
    pub encoding: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<f32>,
    pub framerate: Option<u32>,
    pub bitrate: Option<u32>,
}

impl MediaProfile {
    pub fn area(&self) -> u64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => w as u64 * h as u64,
            _ => 0,
        }
    }
}

impl std::fmt::Display for MediaProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name.as_deref().unwrap_or(&self.token))?;
        let mut video_info = Vec::new();
        if let Some(enc) = &self.encoding {
            video_info.push(enc.to_lowercase());
        }
        if let (Some(w), Some(h)) = (self.width, self.height) {
            video_info.push(format!("{}x{}", w, h));
        }
        if let Some(fps) = self.framerate {
            video_info.push(format!("{}fps", fps));
        }
        if !video_info.is_empty() {
            write!(f, " - {}", video_info.join(" "))?;
        }
        Ok(())
    }
}

fn token_attr(e: &BytesStart) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == b"token")
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_num<T: std::str::FromStr>(text: &str) -> Option<T> {
    text.parse().ok().or_else(|| {
        // Some devices report integers as "4.000000"
        text.parse::<f64>().ok().and_then(|f| f.trunc().to_string().parse().ok())
    })
}

/// Parse a GetProfiles response. Profiles without a token are dropped.
pub fn extract_profiles(xml: &str) -> Vec<MediaProfile> {
    let mut profiles = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Local names of the open elements below the current <Profiles>
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<MediaProfile> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                let tag = String::from_utf8_lossy(local.as_ref()).into_owned();
                if tag == "Profiles" && current.is_none() {
                    current = Some(MediaProfile {
                        token: token_attr(&e).unwrap_or_default(),
                        ..Default::default()
                    });
                    path.clear();
                } else if current.is_some() {
                    path.push(tag);
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"Profiles" && path.is_empty() {
                    if let Some(profile) = current.take() {
                        if !profile.token.is_empty() {
                            profiles.push(profile);
                        }
                    }
                } else {
                    path.pop();
                }
            }
            Ok(Event::Text(t)) => {
                let Some(profile) = current.as_mut() else {
                    continue;
                };
                let Ok(text) = t.unescape() else {
                    continue;
                };
                let text = text.trim().to_string();
                let p: Vec<&str> = path.iter().map(String::as_str).collect();
                match p.as_slice() {
                    ["Name"] => profile.name = Some(text),
                    ["VideoSourceConfiguration", "Name"] => profile.video_source_name = Some(text),
                    ["VideoSourceConfiguration", "SourceToken"] => {
                        profile.video_source_token = Some(text)
                    }
                    ["VideoEncoderConfiguration", "Encoding"] => profile.encoding = Some(text),
                    ["VideoEncoderConfiguration", "Quality"] => profile.quality = text.parse().ok(),
                    ["VideoEncoderConfiguration", "Resolution", "Width"] => {
                        profile.width = parse_num(&text)
                    }
                    ["VideoEncoderConfiguration", "Resolution", "Height"] => {
                        profile.height = parse_num(&text)
                    }
                    ["VideoEncoderConfiguration", "RateControl", "FrameRateLimit"] => {
                        profile.framerate = parse_num(&text)
                    }
                    ["VideoEncoderConfiguration", "RateControl", "BitrateLimit"] => {
                        profile.bitrate = parse_num(&text)
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!("Malformed GetProfiles response: {}", e);
                break;
            }
            _ => {}
        }
    }

    profiles
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const PROFILES_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope" xmlns:tt="http://www.onvif.org/ver10/schema" xmlns:trt="http://www.onvif.org/ver10/media/wsdl">
<SOAP-ENV:Body><trt:GetProfilesResponse>
<trt:Profiles token="Profile_101" fixed="true">
  <tt:Name>mainStream</tt:Name>
  <tt:VideoSourceConfiguration token="VideoSourceToken">
    <tt:Name>Front Door</tt:Name>
    <tt:UseCount>2</tt:UseCount>
    <tt:SourceToken>VideoSource_1</tt:SourceToken>
    <tt:Bounds x="0" y="0" width="1920" height="1080"/>
  </tt:VideoSourceConfiguration>
  <tt:VideoEncoderConfiguration token="VideoEncoderToken_101">
    <tt:Name>VideoEncoder_101</tt:Name>
    <tt:Encoding>H264</tt:Encoding>
    <tt:Resolution><tt:Width>1920</tt:Width><tt:Height>1080</tt:Height></tt:Resolution>
    <tt:Quality>4.000000</tt:Quality>
    <tt:RateControl><tt:FrameRateLimit>25</tt:FrameRateLimit><tt:EncodingInterval>1</tt:EncodingInterval><tt:BitrateLimit>4096</tt:BitrateLimit></tt:RateControl>
  </tt:VideoEncoderConfiguration>
</trt:Profiles>
<trt:Profiles token="Profile_102" fixed="true">
  <tt:Name>subStream</tt:Name>
  <tt:VideoSourceConfiguration token="VideoSourceToken">
    <tt:Name>Front Door</tt:Name>
    <tt:SourceToken>VideoSource_1</tt:SourceToken>
  </tt:VideoSourceConfiguration>
  <tt:VideoEncoderConfiguration token="VideoEncoderToken_102">
    <tt:Name>VideoEncoder_102</tt:Name>
    <tt:Encoding>H264</tt:Encoding>
    <tt:Resolution><tt:Width>640</tt:Width><tt:Height>360</tt:Height></tt:Resolution>
    <tt:Quality>1</tt:Quality>
    <tt:RateControl><tt:FrameRateLimit>15</tt:FrameRateLimit><tt:BitrateLimit>512</tt:BitrateLimit></tt:RateControl>
  </tt:VideoEncoderConfiguration>
</trt:Profiles>
</trt:GetProfilesResponse></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;

    #[test]
    fn test_extract_profiles() {
        let profiles = extract_profiles(PROFILES_RESPONSE);
        assert_eq!(profiles.len(), 2);

        let main = &profiles[0];
        assert_eq!(main.token, "Profile_101");
        assert_eq!(main.name.as_deref(), Some("mainStream"));
        assert_eq!(main.video_source_token.as_deref(), Some("VideoSource_1"));
        assert_eq!(main.video_source_name.as_deref(), Some("Front Door"));
        assert_eq!((main.width, main.height), (Some(1920), Some(1080)));
        assert_eq!(main.quality, Some(4.0));
        assert_eq!(main.framerate, Some(25));
        assert_eq!(main.bitrate, Some(4096));

        assert_eq!(profiles[1].area(), 640 * 360);
        assert_eq!(profiles[1].quality, Some(1.0));
    }

    #[test]
    fn test_profile_without_token_dropped() {
        let xml = r#"<Envelope><Body><GetProfilesResponse>
<Profiles><Name>x</Name></Profiles>
<Profiles token="ok"><Name>y</Name></Profiles>
</GetProfilesResponse></Body></Envelope>"#;
        let profiles = extract_profiles(xml);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].token, "ok");
        assert_eq!(profiles[0].video_source_token, None);
    }

    #[test]
    fn test_display() {
        let profiles = extract_profiles(PROFILES_RESPONSE);
        assert_eq!(profiles[0].to_string(), "mainStream - h264 1920x1080 25fps");
    }
}
