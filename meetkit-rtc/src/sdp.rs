//! SDP inspection and the subscription-array repair it drives

use meetkit_core::{Error, Result, StreamId};
use sdp::description::session::SessionDescription;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// Origin username the backend uses to recognise unified-plan offers
const UNIFIED_PLAN_ORIGIN_USERNAME: &str = "mozilla...THIS_IS_SDPARTA-65.0";

/// Negotiated direction of a media section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaDirection {
    SendOnly,
    RecvOnly,
    Inactive,
    SendRecv,
}

impl MediaDirection {
    fn from_attribute(key: &str) -> Option<Self> {
        match key {
            "sendonly" => Some(Self::SendOnly),
            "recvonly" => Some(Self::RecvOnly),
            "inactive" => Some(Self::Inactive),
            "sendrecv" => Some(Self::SendRecv),
            _ => None,
        }
    }
}

impl fmt::Display for MediaDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SendOnly => "sendonly",
            Self::RecvOnly => "recvonly",
            Self::Inactive => "inactive",
            Self::SendRecv => "sendrecv",
        };
        f.write_str(name)
    }
}

/// SDP operations the negotiation core depends on
pub trait SdpEditor: Send + Sync {
    /// Rewrite a local description into the format the backend expects
    /// from unified-plan clients
    fn to_unified_format(&self, sdp: &str) -> String;

    /// Direction of every video media section, in section order
    fn video_section_directions(&self, sdp: &str) -> Result<Vec<MediaDirection>>;
}

/// [`SdpEditor`] backed by the `sdp` crate parser
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSdpEditor;

impl SdpEditor for SessionSdpEditor {
    fn to_unified_format(&self, sdp: &str) -> String {
        if sdp.contains(UNIFIED_PLAN_ORIGIN_USERNAME) {
            return sdp.to_string();
        }

        let mut rewritten = String::with_capacity(sdp.len() + UNIFIED_PLAN_ORIGIN_USERNAME.len());
        let mut replaced = false;
        for line in sdp.split_inclusive('\n') {
            match line.strip_prefix("o=") {
                Some(origin) if !replaced => {
                    let rest = origin.split_once(' ').map_or("", |(_, rest)| rest);
                    rewritten.push_str("o=");
                    rewritten.push_str(UNIFIED_PLAN_ORIGIN_USERNAME);
                    rewritten.push(' ');
                    rewritten.push_str(rest);
                    replaced = true;
                }
                _ => rewritten.push_str(line),
            }
        }
        rewritten
    }

    fn video_section_directions(&self, sdp: &str) -> Result<Vec<MediaDirection>> {
        let mut reader = Cursor::new(sdp.as_bytes());
        let description = SessionDescription::unmarshal(&mut reader)
            .map_err(|e| Error::Sdp(format!("failed to parse local description: {e}")))?;

        let directions = description
            .media_descriptions
            .iter()
            .filter(|media| media.media_name.media == "video")
            .map(|media| {
                // A zero port marks a rejected or stopped section
                if media.media_name.port.value == 0 {
                    return MediaDirection::Inactive;
                }
                media
                    .attributes
                    .iter()
                    .find_map(|attr| MediaDirection::from_attribute(&attr.key))
                    .unwrap_or(MediaDirection::SendRecv)
            })
            .collect();

        Ok(directions)
    }
}

/// Result of aligning a subscription array with the negotiated sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRepair {
    /// One entry per video section
    pub subscriptions: Vec<StreamId>,
    /// Receive-only sections left at 0 because the input ran out
    pub unfilled_sections: usize,
    /// Non-zero input values no receive-only section consumed
    pub unused_subscriptions: usize,
}

impl SubscriptionRepair {
    /// True when input and sections matched one to one
    #[must_use]
    pub const fn is_exact(&self) -> bool {
        self.unfilled_sections == 0 && self.unused_subscriptions == 0
    }
}

/// Realign `subscriptions` with the video sections described by `directions`
///
/// Sections that do not only receive get 0. Receive-only sections take the
/// non-zero input values in order.
#[must_use]
pub fn repair_subscription_order(
    directions: &[MediaDirection],
    subscriptions: &[StreamId],
) -> SubscriptionRepair {
    let mut available = subscriptions.iter().copied().filter(|&id| id != 0);
    let mut unfilled_sections = 0;

    let repaired = directions
        .iter()
        .map(|direction| {
            if *direction != MediaDirection::RecvOnly {
                return 0;
            }
            available.next().unwrap_or_else(|| {
                unfilled_sections += 1;
                0
            })
        })
        .collect();

    SubscriptionRepair {
        subscriptions: repaired,
        unfilled_sections,
        unused_subscriptions: available.count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MediaDirection::{Inactive, RecvOnly, SendOnly, SendRecv};

    const OFFER: &str = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1 2 3\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
a=sendrecv\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:1\r\n\
a=sendonly\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:2\r\n\
a=recvonly\r\n\
m=video 0 UDP/TLS/RTP/SAVPF 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:3\r\n\
a=recvonly\r\n";

    #[test]
    fn test_video_section_directions() {
        let directions = SessionSdpEditor.video_section_directions(OFFER).unwrap();
        assert_eq!(directions, vec![SendOnly, RecvOnly, Inactive]);
    }

    #[test]
    fn test_unparseable_sdp_is_error() {
        assert!(SessionSdpEditor.video_section_directions("garbage").is_err());
    }

    #[test]
    fn test_to_unified_format_rewrites_origin_once() {
        let unified = SessionSdpEditor.to_unified_format(OFFER);
        assert!(unified.contains(
            "o=mozilla...THIS_IS_SDPARTA-65.0 4611731400430051336 2 IN IP4 127.0.0.1\r\n"
        ));
        assert_eq!(unified.matches("o=").count(), 1);
        assert_eq!(SessionSdpEditor.to_unified_format(&unified), unified);
    }

    #[test]
    fn test_repair_skips_zeros_and_non_receiving_sections() {
        let repair = repair_subscription_order(&[SendOnly, RecvOnly, RecvOnly], &[0, 7, 0, 9]);
        assert_eq!(repair.subscriptions, vec![0, 7, 9]);
        assert!(repair.is_exact());
    }

    #[test]
    fn test_repair_under_provisioned() {
        let repair = repair_subscription_order(&[RecvOnly, SendRecv, RecvOnly, RecvOnly], &[3]);
        assert_eq!(repair.subscriptions, vec![3, 0, 0, 0]);
        assert_eq!(repair.unfilled_sections, 2);
        assert_eq!(repair.unused_subscriptions, 0);
    }

    #[test]
    fn test_repair_over_provisioned() {
        let repair = repair_subscription_order(&[SendOnly, RecvOnly], &[4, 5, 6]);
        assert_eq!(repair.subscriptions, vec![0, 4]);
        assert_eq!(repair.unused_subscriptions, 2);
        assert!(!repair.is_exact());
    }

    #[test]
    fn test_repair_invariants_over_generated_sections() {
        let all = [SendOnly, RecvOnly, Inactive, SendRecv];
        // Every direction sequence up to length 5, against a few inputs
        for len in 0..=5u32 {
            for code in 0..4usize.pow(len) {
                let directions: Vec<_> = (0..len)
                    .map(|i| all[(code / 4usize.pow(i)) % 4])
                    .collect();
                for input in [&[][..], &[1, 0, 2][..], &[5, 6, 7, 8, 9, 10][..]] {
                    let repair = repair_subscription_order(&directions, input);
                    assert_eq!(repair.subscriptions.len(), directions.len());
                    for (direction, id) in directions.iter().zip(&repair.subscriptions) {
                        if *direction != RecvOnly {
                            assert_eq!(*id, 0);
                        }
                    }
                    let again = repair_subscription_order(&directions, &repair.subscriptions);
                    assert_eq!(again.subscriptions, repair.subscriptions);
                }
            }
        }
    }

    #[test]
    fn test_repair_is_noop_on_aligned_array() {
        let directions = [SendOnly, RecvOnly, RecvOnly, Inactive];
        let aligned = [0, 11, 12, 0];
        let repair = repair_subscription_order(&directions, &aligned);
        assert_eq!(repair.subscriptions, aligned);
        assert!(repair.is_exact());
    }
}
