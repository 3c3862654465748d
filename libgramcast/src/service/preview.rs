//! Non-mutating previews for selective publishing
//!
//! Everything here reads rotation state without advancing it, so a caller can
//! show what the next post would contain and let a person choose from the
//! candidates before calling the selective publish operations.

use serde::{Deserialize, Serialize};

use crate::error::{GramcastError, Result};
use crate::selector::ContentSelector;
use crate::types::{Account, ContentType};

/// Videos offered by the combined preview
pub const DEFAULT_VIDEO_CANDIDATES: usize = 8;

/// Combined preview of an account's next post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub videos: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct PreviewService {
    selector: ContentSelector,
}

impl PreviewService {
    pub fn new(selector: ContentSelector) -> Self {
        Self { selector }
    }

    /// Caption the next publish would use
    pub async fn caption(&self, account: &Account) -> Result<String> {
        self.selector.peek_caption(account).await
    }

    /// Upcoming images, three more than `count` (default: slides per post)
    pub fn image_candidates(&self, account: &Account, count: Option<usize>) -> Result<Vec<String>> {
        self.selector.candidate_images(account, count)
    }

    /// First `k` unused videos
    pub fn video_candidates(&self, account: &Account, k: usize) -> Result<Vec<String>> {
        self.selector.candidate_videos(account, k)
    }

    /// Caption plus image candidates for carousels, or plus eight video
    /// candidates for reels
    ///
    /// A caption list that cannot be fetched or is empty shows as an empty
    /// caption instead of failing the preview.
    pub async fn preview(&self, account: &Account) -> Result<Preview> {
        self.preview_with(account, None, DEFAULT_VIDEO_CANDIDATES).await
    }

    /// [`preview`](Self::preview) with explicit candidate counts
    pub async fn preview_with(
        &self,
        account: &Account,
        image_count: Option<usize>,
        video_count: usize,
    ) -> Result<Preview> {
        let caption = match self.caption(account).await {
            Ok(caption) => caption,
            Err(GramcastError::Fetch(e)) => {
                tracing::warn!(account = account.display_name(), "No caption preview: {}", e);
                String::new()
            }
            Err(e) => return Err(e),
        };

        let (images, videos) = match account.content_type {
            ContentType::Carousel => (Some(self.image_candidates(account, image_count)?), None),
            ContentType::Reel => (None, Some(self.video_candidates(account, video_count)?)),
        };

        Ok(Preview {
            content_type: account.content_type,
            caption,
            images,
            videos,
        })
    }
}
