// Paged GetFeature client: COUNT -> PAGE x N -> DONE.
//
// Pages are strictly sequential because the next startIndex depends on how
// many features the previous page actually returned. The hits pre-check is
// expected to bound iteration in practice; MAX_PAGES makes that a hard
// invariant instead of an assumption.
use std::future::Future;

use crate::errors::PipelineError;
use crate::gml;
use crate::models::{FeatureCollection, LngLatBounds};

/// Features requested per page.
pub const DEFAULT_PAGE_SIZE: u64 = 2000;
/// Hard cap on pages per fetch. A well-behaved server never gets near it; a
/// misbehaving one aborts instead of looping forever.
pub const MAX_PAGES: u32 = 64;

/// The building-point feature service. Defaults to the Norwegian cadastre
/// building points.
#[derive(Clone, Debug)]
pub struct WfsEndpoint {
    pub base_url: String,
    pub type_name: String,
}

impl Default for WfsEndpoint {
    fn default() -> Self {
        WfsEndpoint {
            base_url: "https://wfs.geonorge.no/skwms1/wfs.matrikkelen-bygningspunkt".to_string(),
            type_name: "app:Bygning".to_string(),
        }
    }
}

impl WfsEndpoint {
    fn query_base(&self, bounds: &LngLatBounds) -> String {
        format!(
            "{}?service=WFS&version=2.0.0&request=GetFeature&typeNames={}&srsName=EPSG:4326&bbox={},{},{},{},EPSG:4326",
            self.base_url, self.type_name, bounds.west, bounds.south, bounds.east, bounds.north
        )
    }

    /// Count-only request; the response carries numberMatched and no members.
    pub fn hits_url(&self, bounds: &LngLatBounds) -> String {
        format!("{}&resultType=hits", self.query_base(bounds))
    }

    pub fn page_url(&self, bounds: &LngLatBounds, start_index: u64, count: u64) -> String {
        format!(
            "{}&count={}&startIndex={}",
            self.query_base(bounds),
            count,
            start_index
        )
    }
}

/// Drives the page loop. `get_page` is called with the next start index and
/// returns one page of raw XML; any failure aborts the whole fetch with no
/// partial result and no retry.
///
/// Stop conditions, checked in order after each page: the page was empty;
/// the page was short; the accumulated count reached `expected_total` (when
/// known). Exceeding MAX_PAGES is an error.
pub async fn fetch_pages<F, Fut>(
    mut get_page: F,
    page_size: u64,
    expected_total: Option<u64>,
) -> Result<FeatureCollection, PipelineError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<String, PipelineError>>,
{
    let mut collection = FeatureCollection::new();
    let mut start_index = 0u64;
    let mut pages = 0u32;

    loop {
        if pages >= MAX_PAGES {
            return Err(PipelineError::PageLimitExceeded(MAX_PAGES));
        }

        let xml = get_page(start_index).await?;
        let page = gml::parse(&xml)?;
        let returned = page.features.len() as u64;
        collection.features.extend(page.features);
        pages += 1;

        if returned == 0 {
            break; // exhausted
        }
        if returned < page_size {
            break; // short page, nothing after it
        }
        if let Some(total) = expected_total {
            if collection.features.len() as u64 >= total {
                break; // defensive cap against server over-delivery
            }
        }
        start_index += returned;
    }

    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::cell::Cell;

    fn page_xml(points: u64) -> String {
        let members: String = (0..points)
            .map(|i| {
                format!(
                    concat!(
                        "<wfs:member><app:Bygning>",
                        "<app:punkt><gml:pos>8.0{} 58.1</gml:pos></app:punkt>",
                        "</app:Bygning></wfs:member>"
                    ),
                    i
                )
            })
            .collect();
        format!(
            concat!(
                "<wfs:FeatureCollection xmlns:wfs=\"http://www.opengis.net/wfs/2.0\" ",
                "xmlns:gml=\"http://www.opengis.net/gml/3.2\" ",
                "xmlns:app=\"http://example.com/app\">{}</wfs:FeatureCollection>"
            ),
            members
        )
    }

    #[test]
    fn urls_carry_the_wfs_2_0_parameters() {
        let endpoint = WfsEndpoint::default();
        let mut bounds = LngLatBounds::empty();
        bounds.extend(7.9, 58.0);
        bounds.extend(8.1, 58.2);

        let hits = endpoint.hits_url(&bounds);
        assert!(hits.contains("service=WFS"));
        assert!(hits.contains("version=2.0.0"));
        assert!(hits.contains("request=GetFeature"));
        assert!(hits.contains("bbox=7.9,58,8.1,58.2,EPSG:4326"));
        assert!(hits.ends_with("resultType=hits"));

        let page = endpoint.page_url(&bounds, 4000, 2000);
        assert!(page.contains("count=2000"));
        assert!(page.contains("startIndex=4000"));
        assert!(!page.contains("resultType"));
    }

    #[test]
    fn three_pages_yield_all_features_in_three_requests() {
        let sizes = [2u64, 2, 1];
        let calls = Cell::new(0u32);

        let fc = block_on(fetch_pages(
            |start_index| {
                let call = calls.get();
                calls.set(call + 1);
                assert_eq!(
                    start_index,
                    (0..call as u64).map(|i| sizes[i as usize]).sum::<u64>()
                );
                let xml = page_xml(sizes[call as usize]);
                async move { Ok(xml) }
            },
            2,
            None,
        ))
        .unwrap();

        assert_eq!(fc.features.len(), 5);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn empty_first_page_stops_immediately() {
        let calls = Cell::new(0u32);
        let fc = block_on(fetch_pages(
            |_| {
                calls.set(calls.get() + 1);
                let xml = page_xml(0);
                async move { Ok(xml) }
            },
            2,
            None,
        ))
        .unwrap();
        assert!(fc.features.is_empty());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn expected_total_caps_an_overdelivering_server() {
        let calls = Cell::new(0u32);
        let fc = block_on(fetch_pages(
            |_| {
                calls.set(calls.get() + 1);
                let xml = page_xml(2); // always a full page
                async move { Ok(xml) }
            },
            2,
            Some(3),
        ))
        .unwrap();
        assert!(fc.features.len() as u64 >= 3);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn page_limit_aborts_a_runaway_loop() {
        let err = block_on(fetch_pages(
            |_| {
                let xml = page_xml(1);
                async move { Ok(xml) }
            },
            1,
            None,
        ))
        .unwrap_err();
        assert!(matches!(err, PipelineError::PageLimitExceeded(MAX_PAGES)));
    }

    #[test]
    fn a_failed_page_aborts_the_whole_fetch() {
        let calls = Cell::new(0u32);
        let err = block_on(fetch_pages(
            |_| {
                calls.set(calls.get() + 1);
                let fail = calls.get() == 2;
                let xml = page_xml(2);
                async move {
                    if fail {
                        Err(PipelineError::Network("connection reset".to_string()))
                    } else {
                        Ok(xml)
                    }
                }
            },
            2,
            None,
        ))
        .unwrap_err();
        assert!(matches!(err, PipelineError::Network(_)));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn a_service_exception_mid_fetch_aborts() {
        let calls = Cell::new(0u32);
        let err = block_on(fetch_pages(
            |_| {
                calls.set(calls.get() + 1);
                let xml = if calls.get() == 1 {
                    page_xml(2)
                } else {
                    concat!(
                        "<ows:ExceptionReport xmlns:ows=\"http://www.opengis.net/ows/1.1\">",
                        "<ows:Exception><ows:ExceptionText>busy</ows:ExceptionText></ows:Exception>",
                        "</ows:ExceptionReport>"
                    )
                    .to_string()
                };
                async move { Ok(xml) }
            },
            2,
            None,
        ))
        .unwrap_err();
        assert!(matches!(err, PipelineError::Protocol(m) if m == "busy"));
    }
}
