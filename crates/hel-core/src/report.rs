//! Plain-text run report stored next to the output tables.
use std::fmt::Write;

use crate::model::{
    DelineationResult, DeterminationSource, FieldDetermination, HelCategory, InitialSummaryRow,
};

/// `HEL_Determination_TRACT(<t>)_FARM(<f>)_CLU(<ids>).txt`
pub fn file_name(tract: &str, farm: &str, field_ids: &[String]) -> String {
    format!(
        "HEL_Determination_TRACT({tract})_FARM({farm})_CLU({}).txt",
        field_ids.join("_")
    )
}

pub struct Report<'a> {
    pub tract: &'a str,
    pub farm: &'a str,
    pub initial: &'a [InitialSummaryRow],
    /// Present only when terrain processing ran.
    pub delineations: Option<&'a [DelineationResult]>,
    pub fields: &'a [FieldDetermination],
}

impl Report<'_> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "HEL Determination")?;
        writeln!(out, "Tract: {}  Farm: {}", self.tract, self.farm)?;

        writeln!(out, "\nSummary by CLU:")?;
        for field in self.fields {
            writeln!(out, "    CLU {} -- {:.1} ac", field.field_id, field.acres)?;
            for category in HelCategory::ALL {
                let Some(row) = self
                    .initial
                    .iter()
                    .find(|r| r.field_id == field.field_id && r.category == category)
                else {
                    continue;
                };
                writeln!(out, "        {:<4} -- {:>8.1} ac -- {:>5.1} %", category, row.acres, row.percent)?;
            }
        }

        if let Some(delineations) = self.delineations {
            writeln!(out, "\nFinal HEL Summary:")?;
            for d in delineations {
                writeln!(
                    out,
                    "    {:>4}  CLU {:<6} {:<8} {:<4} {:>8.1} ac  HEL {:>8.1} ac {:>5.1} %  {}",
                    d.id,
                    d.field_id,
                    d.musym,
                    d.category,
                    d.polygon_acres,
                    d.final_hel_acres,
                    d.final_hel_percent,
                    d.final_value
                )?;
            }
        }

        writeln!(out, "\nField Determination:")?;
        for f in self.fields {
            writeln!(
                out,
                "    CLU {:<6} {:<4}  HEL {:>8.1} ac ({:>5.1} %)  NHEL {:>8.1} ac ({:>5.1} %)  [{}]",
                f.field_id,
                f.determination,
                f.hel_acres,
                f.hel_percent,
                f.nhel_acres,
                f.nhel_percent,
                match f.source {
                    DeterminationSource::Vector => "soil categories",
                    DeterminationSource::Terrain => "terrain",
                }
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Determination;

    #[test]
    fn report_lists_every_field() {
        let initial = vec![
            InitialSummaryRow { field_id: "7".into(), category: HelCategory::Hel, acres: 40.0, percent: 40.0 },
            InitialSummaryRow { field_id: "7".into(), category: HelCategory::Phel, acres: 60.0, percent: 60.0 },
        ];
        let fields = vec![FieldDetermination {
            field_id: "7".into(),
            tract: "1200".into(),
            farm: "34".into(),
            county: "055".into(),
            acres: 100.0,
            hel_acres: 40.0,
            hel_percent: 40.0,
            nhel_acres: 0.0,
            nhel_percent: 0.0,
            determination: Determination::Hel,
            source: DeterminationSource::Vector,
        }];
        let text = Report { tract: "1200", farm: "34", initial: &initial, delineations: None, fields: &fields }
            .render();
        assert!(text.contains("Tract: 1200  Farm: 34"));
        assert!(text.contains("HEL  --     40.0 ac --  40.0 %"));
        assert!(text.contains("PHEL --     60.0 ac --  60.0 %"));
        assert!(!text.contains("Final HEL Summary"));
        assert!(text.contains("[soil categories]"));

        assert_eq!(
            file_name("1200", "34", &["7".into(), "9".into()]),
            "HEL_Determination_TRACT(1200)_FARM(34)_CLU(7_9).txt"
        );
    }
}
