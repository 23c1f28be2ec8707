use anyhow::{Context, Result};

use crate::recognition::{Detection, JobHandle, RecognitionService, VideoMetadata};

/// Records requested per results page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Everything a completed job produced.
#[derive(Clone, Debug, Default)]
pub struct JobResults {
    /// Detections in page arrival order.
    pub detections: Vec<Detection>,
    /// Metadata from the first page that carried any.
    pub video_metadata: Option<VideoMetadata>,
    pub pages: usize,
}

/// Collect every result record of a completed job.
///
/// Pages are requested until one arrives without a continuation token. A
/// failing page aborts the whole collection; records gathered so far are
/// discarded. Records are not deduplicated.
pub fn fetch_all_results(
    service: &dyn RecognitionService,
    job: &JobHandle,
    page_size: u32,
) -> Result<JobResults> {
    let mut results = JobResults::default();
    let mut next_token: Option<String> = None;

    loop {
        let page = service
            .results_page(job, page_size, next_token.as_deref())
            .with_context(|| format!("fetch results page {} for job {}", results.pages + 1, job))?;
        results.pages += 1;
        log::debug!(
            "job {}: page {} carried {} records",
            job,
            results.pages,
            page.detections.len()
        );

        if results.video_metadata.is_none() {
            results.video_metadata = page.video_metadata;
        }
        results.detections.extend(page.detections);

        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    log::info!(
        "job {}: {} detections across {} pages",
        job,
        results.detections.len(),
        results.pages
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::NormalizedBox;
    use crate::recognition::{CelebrityFace, NotificationChannel, ResultsPage, VideoRef};
    use anyhow::anyhow;
    use std::cell::RefCell;

    /// Serves pages of `sizes` records, chained by tokens "t1", "t2", ...
    struct PagedService {
        sizes: Vec<usize>,
        fail_at: Option<usize>,
        seen_tokens: RefCell<Vec<Option<String>>>,
    }

    impl PagedService {
        fn new(sizes: Vec<usize>) -> Self {
            Self {
                sizes,
                fail_at: None,
                seen_tokens: RefCell::new(Vec::new()),
            }
        }
    }

    impl RecognitionService for PagedService {
        fn start_job(&self, _: &VideoRef, _: &NotificationChannel) -> Result<JobHandle> {
            Ok(JobHandle::new("job"))
        }

        fn results_page(
            &self,
            _job: &JobHandle,
            page_size: u32,
            next_token: Option<&str>,
        ) -> Result<ResultsPage> {
            assert_eq!(page_size, DEFAULT_PAGE_SIZE);
            self.seen_tokens
                .borrow_mut()
                .push(next_token.map(str::to_string));
            let index = match next_token {
                None => 0,
                Some(token) => token.trim_start_matches('t').parse::<usize>()?,
            };
            if self.fail_at == Some(index) {
                return Err(anyhow!("throttled"));
            }
            let detections = (0..self.sizes[index])
                .map(|i| Detection {
                    subject_name: format!("p{}-r{}", index, i),
                    timestamp_ms: (index * 100 + i) as u64,
                    bounding_box: NormalizedBox::default(),
                    confidence: None,
                })
                .collect();
            let next_token = (index + 1 < self.sizes.len()).then(|| format!("t{}", index + 1));
            let video_metadata = (index == 0).then(|| VideoMetadata {
                codec: Some("h264".to_string()),
                frame_rate: Some(30.0),
                ..VideoMetadata::default()
            });
            Ok(ResultsPage {
                detections,
                video_metadata,
                next_token,
            })
        }

        fn recognize_image(&self, _: &[u8]) -> Result<Vec<CelebrityFace>> {
            Ok(vec![])
        }
    }

    #[test]
    fn accumulates_all_pages_in_order() {
        let service = PagedService::new(vec![10, 10, 3]);
        let results =
            fetch_all_results(&service, &JobHandle::new("job"), DEFAULT_PAGE_SIZE).unwrap();

        assert_eq!(results.detections.len(), 23);
        assert_eq!(results.pages, 3);
        assert_eq!(results.detections[0].subject_name, "p0-r0");
        assert_eq!(results.detections[10].subject_name, "p1-r0");
        assert_eq!(results.detections[22].subject_name, "p2-r2");
        assert_eq!(
            *service.seen_tokens.borrow(),
            vec![None, Some("t1".to_string()), Some("t2".to_string())]
        );
        assert_eq!(
            results.video_metadata.and_then(|m| m.codec).as_deref(),
            Some("h264")
        );
    }

    #[test]
    fn mid_sequence_failure_discards_partial_results() {
        let mut service = PagedService::new(vec![10, 10, 3]);
        service.fail_at = Some(1);
        let err =
            fetch_all_results(&service, &JobHandle::new("job"), DEFAULT_PAGE_SIZE).unwrap_err();
        assert!(err.to_string().contains("page 2"));
    }

    #[test]
    fn single_empty_page_terminates() {
        let service = PagedService::new(vec![0]);
        let results =
            fetch_all_results(&service, &JobHandle::new("job"), DEFAULT_PAGE_SIZE).unwrap();
        assert!(results.detections.is_empty());
        assert_eq!(results.pages, 1);
    }
}
