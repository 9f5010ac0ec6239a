use crate::Result;

use super::{PageContext, PageKey, PageText, PageView};

const MISSING: &str = "--";

/// One-screen overview built from [`super::SystemMetrics`].
#[derive(Debug, Default)]
pub struct StatusPage;

impl PageView for StatusPage {
    fn key(&self) -> PageKey {
        PageKey::Status
    }

    fn get_text(&self, ctx: &PageContext<'_>) -> Result<Option<PageText>> {
        let metrics = ctx.metrics;
        if !metrics.has_data() {
            return Ok(None);
        }
        let soc = metrics
            .battery_soc()
            .map_or_else(|| MISSING.to_string(), |v| format!("{v:.0}%"));
        let pv = metrics
            .pv_power()
            .map_or_else(|| MISSING.to_string(), |v| format!("{v:.0}W"));
        let load = metrics
            .consumption()
            .map_or_else(|| MISSING.to_string(), |v| format!("{v:.0} W"));
        Ok(Some(PageText::new(
            format!("SOC {soc}"),
            format!("PV {pv}"),
            "Load:",
            load,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::memory::MemoryBus,
        pages::{PageKey, PageSet},
    };

    #[test]
    fn skips_without_system_service() {
        let bus = MemoryBus::new();
        let set = PageSet::standard();
        let ctx = set.context(&bus, 16);
        assert_eq!(StatusPage.get_text(&ctx).unwrap(), None);
    }

    #[test]
    fn shows_placeholders_for_missing_totals() {
        let bus = MemoryBus::new().with_service(
            "com.victronenergy.system",
            [("/Dc/Battery/Soc", 81.4.into()), ("/Dc/Pv/Power", 352.0.into())],
        );
        let mut set = PageSet::standard();
        set.discover(&bus);
        let ctx = set.context(&bus, 16);
        let text = StatusPage.get_text(&ctx).unwrap().unwrap();
        assert_eq!(text.lines(16), ["SOC 81%  PV 352W", "Load:         --"]);
        assert!(set.find(PageKey::Status).is_some());
    }
}
