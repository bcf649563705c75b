//! Real headless Chrome renders. Run with `cargo test -- --ignored` on a
//! machine with Chrome or Chromium installed.

use finscrape::config::{BrowserSettings, HttpSettings};
use finscrape::fetch::{BrowserFetcher, Method, PageFetcher};
use finscrape::sites::SiteProfile;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const WEBDRIVER_PAGE: &str = r#"<html><head></head><body>
<p id="flag"></p>
<script>document.getElementById('flag').textContent = 'webdriver=' + navigator.webdriver;</script>
<table><tr><th>Dividend Per Share</th></tr><tr><td>0.51</td></tr></table>
</body></html>"#;

#[tokio::test]
#[ignore = "needs Chrome"]
async fn rendered_page_does_not_see_webdriver() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(WEBDRIVER_PAGE, "text/html"))
        .mount(&server)
        .await;

    let fetcher = BrowserFetcher::new(
        &BrowserSettings {
            challenge_wait_seconds: 0,
            content_wait_seconds: 1,
            respect_download_delay: false,
            ..BrowserSettings::default()
        },
        &HttpSettings::default(),
    );
    let mut profile = SiteProfile::generic();
    profile.ready.clear();

    let page = fetcher.fetch(&server.uri(), &profile).await.unwrap();

    assert_eq!(page.method, Method::Browser);
    assert!(page.html.contains("webdriver="), "{}", page.html);
    assert!(!page.html.contains("webdriver=true"), "{}", page.html);
}
