//! Per-year population and harvest tables.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cohort::{CohortMatrix, Sex};
use crate::engine::HarvestRecord;

/// How harvested individuals are binned in the harvest columns.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum AgeGrouping {
    #[default]
    ByCohort,
    /// Juvenile (age ≤ `juvenile_max_years`), prime (≤ `prime_max_years`),
    /// other.
    Ternary {
        juvenile_max_years: f64,
        prime_max_years: f64,
    },
}

const GROUP_CODES: [char; 3] = ['J', 'P', 'O'];

impl AgeGrouping {
    fn bins(&self, maximum_age: usize) -> usize {
        match self {
            AgeGrouping::ByCohort => maximum_age + 1,
            AgeGrouping::Ternary { .. } => GROUP_CODES.len(),
        }
    }

    fn bin(&self, age_steps: usize, sub_steps: usize, maximum_age: usize) -> usize {
        match *self {
            AgeGrouping::ByCohort => (age_steps / sub_steps).min(maximum_age),
            AgeGrouping::Ternary {
                juvenile_max_years,
                prime_max_years,
            } => {
                let juvenile_cutoff = (juvenile_max_years * sub_steps as f64).floor() as usize;
                let prime_cutoff = (prime_max_years * sub_steps as f64).floor() as usize;
                if age_steps <= juvenile_cutoff {
                    0
                } else if age_steps <= prime_cutoff {
                    1
                } else {
                    2
                }
            }
        }
    }
}

/// Everything recorded for one simulated year.
#[derive(Debug, Clone, Default)]
pub struct YearRecord {
    pub harvest: Vec<HarvestRecord>,
    /// End-of-year cohort before aging; `None` if the year ended early.
    pub population: Option<CohortMatrix>,
}

impl YearRecord {
    pub fn harvested(&self, sex: Sex) -> usize {
        self.harvest.iter().filter(|r| r.sex == sex).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarvestReport {
    pub header: Vec<String>,
    /// First column is the year index; row 0 is the starting population.
    pub rows: Vec<Vec<u64>>,
}

impl HarvestReport {
    pub fn build(
        initial: &CohortMatrix,
        years: &[YearRecord],
        grouping: AgeGrouping,
        sub_steps: usize,
    ) -> Self {
        let maximum_age = initial.maximum_age();
        let bins = grouping.bins(maximum_age);

        let mut header = vec!["Year".to_string()];
        for sex in Sex::ALL {
            header.extend((0..=maximum_age).map(|age| format!("Pop_{}{age}", sex.code())));
        }
        for sex in Sex::ALL {
            match grouping {
                AgeGrouping::ByCohort => {
                    header.extend((0..=maximum_age).map(|age| format!("Hrv_{}{age}", sex.code())));
                }
                AgeGrouping::Ternary { .. } => header.extend(
                    GROUP_CODES
                        .iter()
                        .map(|group| format!("Hrv_{}{group}", sex.code())),
                ),
            }
        }

        let mut rows = Vec::with_capacity(years.len() + 1);
        let mut first = vec![0];
        first.extend(initial.flatten());
        first.extend(std::iter::repeat(0).take(bins * 2));
        rows.push(first);

        let completed = years.iter().filter_map(|y| y.population.as_ref().map(|p| (p, y)));
        for (index, (population, record)) in completed.enumerate() {
            let mut counts = vec![0_u64; bins * 2];
            for kill in &record.harvest {
                let bin = grouping.bin(kill.age_steps, sub_steps, maximum_age);
                counts[kill.sex.index() * bins + bin] += 1;
            }
            let mut row = vec![index as u64 + 1];
            row.extend(population.flatten());
            row.extend(counts);
            rows.push(row);
        }

        Self { header, rows }
    }

    /// Tab-delimited rendering, one line per row including the header.
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "{}", self.header.join("\t"))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(u64::to_string).collect();
            writeln!(writer, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}

/// Destination for finished run reports.
pub trait ReportSink {
    fn emit(&mut self, report: &HarvestReport) -> Result<()>;
}

/// Writes a report as tab-delimited text.
pub struct TsvSink<W: Write> {
    writer: W,
}

impl TsvSink<BufWriter<File>> {
    /// Create (or overwrite) `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create report {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for TsvSink<W> {
    fn emit(&mut self, report: &HarvestReport) -> Result<()> {
        report.write_tsv(&mut self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps reports in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub reports: Vec<HarvestReport>,
}

impl ReportSink for MemorySink {
    fn emit(&mut self, report: &HarvestReport) -> Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initial() -> CohortMatrix {
        let mut cohort = CohortMatrix::new(2);
        cohort.set(Sex::Female, 1, 4);
        cohort.set(Sex::Male, 2, 3);
        cohort
    }

    fn kill(sex: Sex, age_steps: usize) -> HarvestRecord {
        HarvestRecord { sex, age_steps }
    }

    #[test]
    fn test_cohort_header_and_rows() {
        let mut end_of_year = initial();
        end_of_year.set(Sex::Female, 0, 6);
        let years = vec![
            YearRecord {
                harvest: vec![kill(Sex::Female, 5), kill(Sex::Male, 9), kill(Sex::Male, 8)],
                population: Some(end_of_year),
            },
            YearRecord {
                harvest: vec![kill(Sex::Female, 1)],
                population: None,
            },
        ];
        let report = HarvestReport::build(&initial(), &years, AgeGrouping::ByCohort, 4);
        assert_eq!(
            report.header,
            vec![
                "Year", "Pop_F0", "Pop_F1", "Pop_F2", "Pop_M0", "Pop_M1", "Pop_M2", "Hrv_F0",
                "Hrv_F1", "Hrv_F2", "Hrv_M0", "Hrv_M1", "Hrv_M2"
            ]
        );
        assert_eq!(report.rows.len(), 2, "year cut short is not reported");
        assert_eq!(report.rows[0], vec![0, 0, 4, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0]);
        assert_eq!(report.rows[1], vec![1, 6, 4, 0, 0, 0, 3, 0, 1, 0, 0, 0, 2]);
    }

    #[test]
    fn test_ternary_groups() {
        let years = vec![YearRecord {
            harvest: vec![
                kill(Sex::Female, 4),
                kill(Sex::Female, 5),
                kill(Sex::Female, 30),
                kill(Sex::Male, 12),
                kill(Sex::Male, 13),
            ],
            population: Some(initial()),
        }];
        let grouping = AgeGrouping::Ternary {
            juvenile_max_years: 1.0,
            prime_max_years: 3.0,
        };
        let report = HarvestReport::build(&initial(), &years, grouping, 4);
        assert_eq!(
            &report.header[7..],
            &["Hrv_FJ", "Hrv_FP", "Hrv_FO", "Hrv_MJ", "Hrv_MP", "Hrv_MO"]
        );
        assert_eq!(&report.rows[1][7..], &[1, 1, 1, 0, 1, 1]);
    }

    #[test]
    fn test_tsv_output() {
        let report = HarvestReport::build(&initial(), &[], AgeGrouping::ByCohort, 1);
        let mut sink = TsvSink::new(Vec::new());
        sink.emit(&report).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("Year\tPop_F0\t"));
        assert_eq!(lines.next().unwrap(), "0\t0\t4\t0\t0\t0\t3\t0\t0\t0\t0\t0\t0");
        assert!(lines.next().is_none());
    }
}
