use reqwest::Url;

/// URL templates with `{id}`, `{start}`, `{filter_id}` and `{pipeline_id}`
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub pipeline_deals: String,
    pub deal_updates: String,
    pub deal: String,
    pub deals: String,
    pub deal_activities: String,
    pub pipelines: String,
    pub stages: String,
    pub filters: String,
    pub deal_fields: String,
    pub deal_field: String,
    pub organization: String,
}

impl Endpoints {
    pub fn for_base(base: &Url) -> Self {
        let base = base.as_str();
        Self {
            pipeline_deals: format!(
                "{}pipelines/{{pipeline_id}}/deals?everyone=0&start={{start}}&filter_id={{filter_id}}&limit=500",
                base
            ),
            deal_updates: format!("{}deals/{{id}}/updates?start={{start}}", base),
            deal: format!("{}deals/{{id}}", base),
            deals: format!("{}deals?start={{start}}&filter_id={{filter_id}}&limit=500", base),
            deal_activities: format!("{}deals/{{id}}/activities?start={{start}}", base),
            pipelines: format!("{}pipelines", base),
            stages: format!("{}stages?pipeline_id={{pipeline_id}}", base),
            filters: format!("{}filters", base),
            deal_fields: format!("{}dealFields?start={{start}}", base),
            deal_field: format!("{}dealFields/{{id}}", base),
            organization: format!("{}organizations/{{id}}", base),
        }
    }
}

/// Substitute `{name}` placeholders. Unknown placeholders are left alone.
pub fn fill(template: &str, params: &[(&str, u64)]) -> String {
    params.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), &value.to_string())
    })
}

/// URL generator for [`crate::paginate::Paginator`]. Templates without a
/// `{start}` placeholder yield a single URL.
pub fn paged(
    template: &str,
    params: &[(&str, u64)],
) -> impl FnMut(u32) -> crate::Result<Option<String>> + Send + 'static {
    let base = fill(template, params);
    let has_start = base.contains("{start}");
    move |offset| {
        if has_start {
            Ok(Some(fill(&base, &[("start", u64::from(offset))])))
        } else if offset == 0 {
            Ok(Some(base.clone()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Endpoints {
        Endpoints::for_base(&Url::parse("https://api.pipedrive.com/v1/").unwrap())
    }

    #[test]
    fn fill_replaces_named_placeholders() {
        let e = endpoints();
        assert_eq!(
            fill(
                &e.pipeline_deals,
                &[("pipeline_id", 3), ("start", 500), ("filter_id", 0)]
            ),
            "https://api.pipedrive.com/v1/pipelines/3/deals?everyone=0&start=500&filter_id=0&limit=500"
        );
        assert_eq!(fill(&e.deal, &[("id", 674)]), "https://api.pipedrive.com/v1/deals/674");
    }

    #[test]
    fn paged_advances_start() {
        let e = endpoints();
        let mut next = paged(&e.deal_updates, &[("id", 9)]);
        assert_eq!(
            next(0).unwrap().as_deref(),
            Some("https://api.pipedrive.com/v1/deals/9/updates?start=0")
        );
        assert_eq!(
            next(100).unwrap().as_deref(),
            Some("https://api.pipedrive.com/v1/deals/9/updates?start=100")
        );
    }

    #[test]
    fn unpaged_template_yields_once() {
        let e = endpoints();
        let mut next = paged(&e.stages, &[("pipeline_id", 1)]);
        assert!(next(0).unwrap().is_some());
        assert!(next(50).unwrap().is_none());
    }
}
