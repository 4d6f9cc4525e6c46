//! Facility search against the portal's attribute-search form.

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::Page;

use super::types::{FacilityRecord, FacilityRef};
use super::PortalError;
use crate::browser::{BrowserError, SessionManager};
use crate::config;

/// Search boundary. Mockable so the orchestrator can be tested without a
/// browser.
#[async_trait]
pub trait FacilitySearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<FacilityRecord>, PortalError>;
}

/// Candidate selectors for the search form's name field. The portal's markup
/// is unstable; the first match wins.
const NAME_FIELD_SELECTORS: &[&str] = &[
    "input[name='facility_name']",
    "input#facilityName",
    "input[name*='name' i]",
    "form input[type='text']",
];

const SUBMIT_SELECTORS: &[&str] = &[
    "button[type='submit']",
    "input[type='submit']",
    "form button",
];

/// Reject near-empty queries before touching the browser.
pub fn validate_query(query: &str) -> Result<(), PortalError> {
    let significant = query.chars().filter(|c| !c.is_whitespace()).count();
    if significant < 2 {
        return Err(PortalError::QueryTooShort);
    }
    Ok(())
}

/// Live implementation driving the shared browser session.
pub struct PortalLocator {
    session: Arc<SessionManager>,
}

impl PortalLocator {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl FacilitySearch for PortalLocator {
    async fn search(&self, query: &str) -> Result<Vec<FacilityRecord>, PortalError> {
        validate_query(query)?;
        let session = self.session.acquire().await?;
        let page = session.page();

        let url = config::portal_search_url();
        navigate(page, &url).await?;

        let field = first_matching(page, NAME_FIELD_SELECTORS)
            .await
            .ok_or_else(|| PortalError::Navigation {
                url: url.clone(),
                reason: "search form name field not found".to_string(),
            })?;
        field.click().await?;
        field.type_str(query).await?;

        let submit = first_matching(page, SUBMIT_SELECTORS)
            .await
            .ok_or_else(|| PortalError::Navigation {
                url,
                reason: "search form submit control not found".to_string(),
            })?;
        submit.click().await?;

        tokio::time::sleep(config::SEARCH_SETTLE).await;

        let records = parse_result_table(page).await?;
        tracing::info!(query = %query, results = records.len(), "Facility search complete");
        Ok(records)
    }
}

/// Navigate with a bounded timeout so an unresponsive portal cannot stall
/// the run.
pub(crate) async fn navigate(page: &Page, url: &str) -> Result<(), PortalError> {
    let nav = async {
        page.goto(url).await?;
        page.wait_for_navigation().await?;
        Ok::<(), chromiumoxide::error::CdpError>(())
    };
    match tokio::time::timeout(config::NAVIGATION_TIMEOUT, nav).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(PortalError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(PortalError::Browser(BrowserError::Timeout(format!(
            "navigation to {url}"
        )))),
    }
}

/// First element matching any selector in the candidate list, in order.
pub(crate) async fn first_matching(
    page: &Page,
    selectors: &[&str],
) -> Option<chromiumoxide::Element> {
    for selector in selectors {
        if let Ok(element) = page.find_element(*selector).await {
            return Some(element);
        }
    }
    None
}

/// Parse every result-table row into a record. Zero rows is a valid result.
async fn parse_result_table(page: &Page) -> Result<Vec<FacilityRecord>, PortalError> {
    let rows = page
        .find_elements("table tbody tr, table tr")
        .await
        .unwrap_or_default();

    let mut records = Vec::new();
    for row in rows {
        let cells = match row.find_elements("td").await {
            Ok(cells) if !cells.is_empty() => cells,
            // Header rows have no td cells.
            _ => continue,
        };
        let mut texts = Vec::with_capacity(cells.len());
        for cell in cells {
            texts.push(cell.inner_text().await.ok().flatten().unwrap_or_default());
        }
        records.push(FacilityRecord::from_cells(&texts));
    }
    Ok(records)
}

/// Resolve a caller-supplied reference to a detail-page URL.
pub fn detail_url(facility: &FacilityRef) -> String {
    match facility {
        FacilityRef::Id(id) => config::facility_detail_url(id),
        FacilityRef::Url(url) => url.clone(),
    }
}
