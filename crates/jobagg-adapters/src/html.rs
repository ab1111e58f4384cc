use std::sync::Arc;

use async_trait::async_trait;
use jobagg_core::{collapse_whitespace, RawFieldSet};
use jobagg_storage::HttpFetcher;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::{AdapterContext, AdapterError, SourceAdapter};

const SNIPPET_CHARS: usize = 400;

/// CSS selectors locating one listing card and its fields. Field selectors are evaluated
/// inside the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSelectors {
    pub card: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub experience: Option<String>,
    /// Short description inside the card. Cards without one fall back to their full text.
    pub snippet: Option<String>,
    /// Element carrying the posting `href`; falls back to the title element.
    pub link: Option<String>,
    pub posted: Option<String>,
    /// Attribute holding the posted hint (e.g. `datetime`); element text when absent.
    pub posted_attr: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPreset {
    pub base_url: String,
    pub listing_urls: Vec<String>,
    pub selectors: ListingSelectors,
}

pub fn naukri_preset() -> ListingPreset {
    ListingPreset {
        base_url: "https://www.naukri.com".to_string(),
        listing_urls: vec![
            "https://www.naukri.com/cybersecurity-jobs?k=cybersecurity&l=India".to_string(),
            "https://www.naukri.com/information-security-jobs?k=information%20security&l=India"
                .to_string(),
        ],
        selectors: ListingSelectors {
            card: "article.jobTuple, .srp-jobtuple".to_string(),
            title: "a.title, .jobTitle a".to_string(),
            company: "a.comp-name, .companyName".to_string(),
            location: Some(".locationsContainer, .location".to_string()),
            salary: Some("span.salary, .packageContainer".to_string()),
            experience: Some("span.exp, .experience".to_string()),
            snippet: Some(".job-desc, .job-description".to_string()),
            link: None,
            posted: Some(".job-post-day".to_string()),
            posted_attr: None,
        },
    }
}

pub fn indeed_preset() -> ListingPreset {
    ListingPreset {
        base_url: "https://in.indeed.com".to_string(),
        listing_urls: vec![
            "https://in.indeed.com/jobs?q=cybersecurity&l=India&sort=date".to_string(),
            "https://in.indeed.com/jobs?q=information+security&l=India&sort=date".to_string(),
        ],
        selectors: ListingSelectors {
            card: ".job_seen_beacon, [data-testid=\"job-result\"]".to_string(),
            title: "h2 a, .jobTitle a".to_string(),
            company: ".companyName, [data-testid=\"company-name\"]".to_string(),
            location: Some(".companyLocation, [data-testid=\"text-location\"]".to_string()),
            salary: Some(".salary-snippet, [data-testid=\"attribute_snippet_testid\"]".to_string()),
            experience: None,
            snippet: Some(".job-snippet, [data-testid=\"jobsnippet_footer\"]".to_string()),
            link: None,
            posted: Some(".date".to_string()),
            posted_attr: None,
        },
    }
}

pub fn linkedin_preset() -> ListingPreset {
    ListingPreset {
        base_url: "https://www.linkedin.com".to_string(),
        listing_urls: vec![
            "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search?keywords=cybersecurity&location=India&start=0".to_string(),
            "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search?keywords=security%20analyst&location=India&start=0".to_string(),
        ],
        selectors: ListingSelectors {
            card: "li".to_string(),
            title: "h3".to_string(),
            company: "h4".to_string(),
            location: Some(".job-search-card__location, .job-location".to_string()),
            salary: None,
            experience: None,
            snippet: None,
            link: Some("a[href*=\"/jobs/view/\"]".to_string()),
            posted: Some("time".to_string()),
            posted_attr: Some("datetime".to_string()),
        },
    }
}

fn preset_for_source(source_id: &str) -> Option<ListingPreset> {
    match source_id {
        "naukri" => Some(naukri_preset()),
        "indeed" => Some(indeed_preset()),
        "linkedin" => Some(linkedin_preset()),
        _ => None,
    }
}

struct CompiledSelectors {
    card: Selector,
    title: Selector,
    company: Selector,
    location: Option<Selector>,
    salary: Option<Selector>,
    experience: Option<Selector>,
    snippet: Option<Selector>,
    link: Option<Selector>,
    posted: Option<Selector>,
}

fn compile(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn compile_opt(selector: Option<&str>) -> Result<Option<Selector>, AdapterError> {
    selector.map(compile).transpose()
}

impl CompiledSelectors {
    fn new(selectors: &ListingSelectors) -> Result<Self, AdapterError> {
        Ok(Self {
            card: compile(&selectors.card)?,
            title: compile(&selectors.title)?,
            company: compile(&selectors.company)?,
            location: compile_opt(selectors.location.as_deref())?,
            salary: compile_opt(selectors.salary.as_deref())?,
            experience: compile_opt(selectors.experience.as_deref())?,
            snippet: compile_opt(selectors.snippet.as_deref())?,
            link: compile_opt(selectors.link.as_deref())?,
            posted: compile_opt(selectors.posted.as_deref())?,
        })
    }
}

fn text_or_none(value: &str) -> Option<String> {
    let collapsed = collapse_whitespace(value);
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    text_or_none(&element.text().collect::<Vec<_>>().join(" "))
}

fn first_text(card: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    selector
        .and_then(|sel| card.select(sel).next())
        .and_then(element_text)
}

fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text,
    }
}

fn resolve_href(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(_) => base.and_then(|b| b.join(href).ok()).map(|u| u.to_string()),
    }
}

/// Extracts raw field-sets from one listing page. Cards with neither a title nor a company
/// are treated as layout noise and skipped.
pub fn parse_listing_html(
    source_id: &str,
    base_url: &str,
    selectors: &ListingSelectors,
    html: &str,
) -> Result<Vec<RawFieldSet>, AdapterError> {
    let compiled = CompiledSelectors::new(selectors)?;
    let base = Url::parse(base_url).ok();
    let document = Html::parse_document(html);

    let mut out = Vec::new();
    for card in document.select(&compiled.card) {
        let title_el = card.select(&compiled.title).next();
        let title = title_el.and_then(element_text);
        let company = first_text(card, Some(&compiled.company));
        if title.is_none() && company.is_none() {
            continue;
        }

        let link_el = match &compiled.link {
            Some(sel) => card.select(sel).next(),
            None => title_el,
        };
        let url = link_el
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| resolve_href(base.as_ref(), href));

        let posted = compiled.posted.as_ref().and_then(|sel| {
            let el = card.select(sel).next()?;
            match selectors.posted_attr.as_deref() {
                Some(attr) => el.value().attr(attr).and_then(text_or_none),
                None => element_text(el),
            }
        });

        out.push(RawFieldSet {
            source: source_id.to_string(),
            title,
            company,
            location: first_text(card, compiled.location.as_ref()),
            salary: first_text(card, compiled.salary.as_ref()),
            experience: first_text(card, compiled.experience.as_ref()),
            description: first_text(card, compiled.snippet.as_ref())
                .or_else(|| element_text(card))
                .map(|t| truncate_chars(t, SNIPPET_CHARS)),
            url,
            posted,
        });
    }
    Ok(out)
}

/// Fetches configured listing pages over HTTP and parses them with [`ListingSelectors`].
/// A failing page is skipped; the adapter fails only when every page failed.
pub struct HtmlListingAdapter {
    source_id: String,
    base_url: String,
    listing_urls: Vec<String>,
    selectors: ListingSelectors,
    http: Arc<HttpFetcher>,
}

impl HtmlListingAdapter {
    pub fn new(
        source_id: impl Into<String>,
        preset: ListingPreset,
        http: Arc<HttpFetcher>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            base_url: preset.base_url,
            listing_urls: preset.listing_urls,
            selectors: preset.selectors,
            http,
        }
    }

    pub fn listing_urls(&self) -> &[String] {
        &self.listing_urls
    }
}

/// Built-in HTML adapter for a known source. Non-empty `listing_urls` override the preset's.
pub fn html_adapter_for_source(
    source_id: &str,
    listing_urls: &[String],
    http: Arc<HttpFetcher>,
) -> Option<HtmlListingAdapter> {
    let mut preset = preset_for_source(source_id)?;
    if !listing_urls.is_empty() {
        preset.listing_urls = listing_urls.to_vec();
    }
    Some(HtmlListingAdapter::new(source_id, preset, http))
}

#[async_trait]
impl SourceAdapter for HtmlListingAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch(&self, ctx: &AdapterContext) -> Result<Vec<RawFieldSet>, AdapterError> {
        // Bad selectors are a configuration bug; surface them before any request goes out.
        CompiledSelectors::new(&self.selectors)?;

        let mut records = Vec::new();
        let mut failures = 0usize;
        let mut last_error = None;

        for (idx, url) in self.listing_urls.iter().enumerate() {
            if idx > 0 {
                tokio::time::sleep(self.http.request_delay()).await;
            }
            let parsed = match self.http.fetch_text(ctx.run_id, &self.source_id, url).await {
                Ok(page) => parse_listing_html(
                    &self.source_id,
                    &self.base_url,
                    &self.selectors,
                    &page.body,
                ),
                Err(err) => Err(err.into()),
            };
            match parsed {
                Ok(page_records) => {
                    info!(
                        source = %self.source_id,
                        url,
                        count = page_records.len(),
                        "parsed listing page"
                    );
                    records.extend(page_records);
                }
                Err(err) => {
                    warn!(source = %self.source_id, url, error = %err, "listing page failed");
                    failures += 1;
                    last_error = Some(err.to_string());
                }
            }
        }

        if failures > 0 && failures == self.listing_urls.len() {
            return Err(AdapterError::AllPagesFailed {
                pages: failures,
                last: last_error.unwrap_or_default(),
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <article class="jobTuple">
            <a class="title" href="/job-listings-soc-analyst-1">  SOC   Analyst </a>
            <a class="comp-name">Acme Security</a>
            <span class="locationsContainer">Pune</span>
            <span class="salary">₹5-8 Lacs PA</span>
            <span class="exp">2-5 Yrs</span>
            <span class="job-post-day">3 Days Ago</span>
          </article>
          <article class="jobTuple">
            <a class="title" href="https://www.naukri.com/job-listings-grc-2">GRC Consultant</a>
          </article>
          <article class="jobTuple">
            <a class="title" href="/job-listings-cloud-sec-3">Cloud Security Engineer</a>
            <a class="comp-name">Zeta Cloud</a>
            <span class="salary">₹20-30 Lacs PA</span>
            <div class="job-desc">Harden AWS workloads with Terraform.</div>
          </article>
          <article class="jobTuple"><p>advert</p></article>
        </body></html>
    "#;

    #[test]
    fn parses_cards_and_resolves_relative_links() {
        let preset = naukri_preset();
        let records =
            parse_listing_html("naukri", &preset.base_url, &preset.selectors, PAGE).unwrap();
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.source, "naukri");
        assert_eq!(first.title.as_deref(), Some("SOC Analyst"));
        assert_eq!(first.company.as_deref(), Some("Acme Security"));
        assert_eq!(first.location.as_deref(), Some("Pune"));
        assert_eq!(first.salary.as_deref(), Some("₹5-8 Lacs PA"));
        assert_eq!(first.experience.as_deref(), Some("2-5 Yrs"));
        assert_eq!(first.posted.as_deref(), Some("3 Days Ago"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://www.naukri.com/job-listings-soc-analyst-1")
        );
        assert!(first.description.as_deref().unwrap().contains("SOC Analyst"));

        let second = &records[1];
        assert_eq!(second.title.as_deref(), Some("GRC Consultant"));
        assert!(second.company.is_none());
        assert_eq!(
            second.url.as_deref(),
            Some("https://www.naukri.com/job-listings-grc-2")
        );
    }

    #[test]
    fn description_prefers_snippet_over_card_text() {
        let preset = naukri_preset();
        let records =
            parse_listing_html("naukri", &preset.base_url, &preset.selectors, PAGE).unwrap();
        let cloud = &records[2];
        assert_eq!(
            cloud.description.as_deref(),
            Some("Harden AWS workloads with Terraform.")
        );
        assert_eq!(cloud.company.as_deref(), Some("Zeta Cloud"));

        // no snippet on the card: whole card text, company included
        let first = records[0].description.as_deref().unwrap();
        assert!(first.contains("Acme Security"));
    }

    #[test]
    fn invalid_selector_is_reported() {
        let mut selectors = naukri_preset().selectors;
        selectors.card = "article[".to_string();
        let err =
            parse_listing_html("naukri", "https://www.naukri.com", &selectors, PAGE).unwrap_err();
        assert!(matches!(err, AdapterError::Selector { .. }));
    }

    #[test]
    fn snippet_truncation_respects_char_boundaries() {
        let text = "₹".repeat(10);
        assert_eq!(truncate_chars(text.clone(), 4), "₹₹₹₹");
        assert_eq!(truncate_chars(text.clone(), 50), text);
    }

    #[test]
    fn unknown_source_has_no_html_adapter() {
        let http = Arc::new(HttpFetcher::new(Default::default()).unwrap());
        assert!(html_adapter_for_source("monster", &[], http.clone()).is_none());
        let urls = vec!["https://example.test/jobs".to_string()];
        let adapter = html_adapter_for_source("indeed", &urls, http).unwrap();
        assert_eq!(adapter.listing_urls().to_vec(), urls);
    }
}
