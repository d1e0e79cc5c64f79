//! Decides which message attachments are worth rendering.

use std::path::Path;

use crate::messaging::Attachment;

/// Extensions accepted when the declared media type is missing or unhelpful.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "avi", "m4v"];

const VIDEO_MEDIA_PREFIX: &str = "video/";

/// An attachment is eligible when its declared media type is `video/*` or its
/// filename carries one of [`VIDEO_EXTENSIONS`]. Both checks ignore case.
pub fn is_eligible(content_type: Option<&str>, filename: &str) -> bool {
    let declared_video = content_type
        .and_then(|ct| ct.trim_start().get(..VIDEO_MEDIA_PREFIX.len()))
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(VIDEO_MEDIA_PREFIX));

    declared_video || has_video_extension(filename)
}

fn has_video_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
}

/// First eligible attachment of a message; the rest are ignored.
pub fn select_attachment(attachments: &[Attachment]) -> Option<&Attachment> {
    attachments.iter().find(|att| att.is_eligible())
}
