use async_trait::async_trait;

use super::{AssessmentModule, ModuleDescriptor};
use crate::error::Result;
use crate::model::{FindingDraft, Scan, Severity, Target};

/// Reports the links gathered by link discovery.
pub struct LinkCrawler {
    descriptor: ModuleDescriptor,
}

impl LinkCrawler {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new("Web Crawler", "Crawls the target website for links."),
        }
    }
}

impl Default for LinkCrawler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssessmentModule for LinkCrawler {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn run(&self, target: &mut Target, scan: &mut Scan) -> Result<()> {
        let links: Vec<&str> = target.links.iter().map(String::as_str).collect();

        scan.record(
            FindingDraft::new(
                "Crawled Links",
                format!("Crawled links: {}", links.join(", ")),
                Severity::Low,
            )
            .with_component(target.url())
            .with_evidence(format!("{} link(s) crawled", links.len())),
        );
        Ok(())
    }
}
