use test_harness::error::RegistryError;
use test_harness::{Flag, TestCluster, TestDescriptor, TestRegistry, TestResult};

const URLS_TO_FETCH: [&str; 3] = [
    "https://www.example.com/",
    "https://www.wikipedia.org/",
    "https://start.fedoraproject.org/",
];

pub(crate) fn register(registry: &mut TestRegistry) -> Result<(), RegistryError> {
    registry.register(
        TestDescriptor::new("coreos.tls.fetch-urls", fetch_urls)
            .with_flag(Flag::RequiresInternetAccess)
            // wget is not included in RHCOS
            .with_excluded_distros(["rhcos"]),
    )
}

/// Fetches a few HTTPS sites with both curl and wget to check the machine's trust store.
async fn fetch_urls(c: TestCluster) -> TestResult {
    let m = c.machine(0)?;
    for url in URLS_TO_FETCH {
        c.must_ssh(&m, &curl_command(url)).await?;
        c.must_ssh(&m, &wget_command(url)).await?;
    }
    Ok(())
}

fn curl_command(url: &str) -> String {
    format!("curl -s -S -m 30 --retry 2 {}", url)
}

/// wget reports every download on stderr with a `->` line; only genuine errors are kept.
fn wget_command(url: &str) -> String {
    format!(
        "wget -nv -T 30 -t 2 --delete-after {} 2> >(grep -v -- '->' >&2)",
        url
    )
}
