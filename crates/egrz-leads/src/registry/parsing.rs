use super::model::{ConclusionNumber, RawRecord};
use super::RegistryError;
use crate::prelude::*;

const DELIMITER: char = ';';

const CONCLUSION_NUMBER: &str = "Номер заключения экспертизы";
const EXPERTISE_RESULT: &str = "Результат экспертизы";
const PREPARER: &str = "Сведения о лице, подготовившем проектную документацию";
const DEVELOPER: &str = "Сведения о застройщике, техническом заказчике";
const OBJECT_NAME: &str = "Наименование объекта";
const OBJECT_ADDRESS: &str = "Адрес объекта";
const CONCLUSION_DATE: &str = "Дата заключения";

/// Column indices of the known fields in the export header
struct Columns {
    conclusion_number: usize,
    expertise_result: Option<usize>,
    preparer: Option<usize>,
    developer: Option<usize>,
    object_name: Option<usize>,
    object_address: Option<usize>,
    conclusion_date: Option<usize>,
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> Result<Self, RegistryError> {
        let position = |name: &str| header.iter().position(|column| column.trim() == name);

        let conclusion_number = position(CONCLUSION_NUMBER).ok_or_else(|| RegistryError::Parse {
            message: format!(
                "header has no `{CONCLUSION_NUMBER}` column: {:?}",
                header.iter().collect::<Vec<_>>()
            ),
        })?;

        Ok(Self {
            conclusion_number,
            expertise_result: position(EXPERTISE_RESULT),
            preparer: position(PREPARER),
            developer: position(DEVELOPER),
            object_name: position(OBJECT_NAME),
            object_address: position(OBJECT_ADDRESS),
            conclusion_date: position(CONCLUSION_DATE),
        })
    }

    fn record(&self, row: &csv::StringRecord) -> Option<RawRecord> {
        let field = |idx: Option<usize>| {
            idx.and_then(|idx| row.get(idx))
                .map(|value| value.trim().to_owned())
                .unwrap_or_default()
        };

        let conclusion_number = field(Some(self.conclusion_number));
        if conclusion_number.is_empty() {
            return None;
        }

        Some(RawRecord {
            conclusion_number: ConclusionNumber::new(conclusion_number),
            expertise_result: field(self.expertise_result),
            preparer: field(self.preparer),
            developer: field(self.developer),
            object_name: field(self.object_name),
            object_address: field(self.object_address),
            conclusion_date: field(self.conclusion_date),
        })
    }
}

fn is_header_line(line: &str) -> bool {
    line.split(DELIMITER)
        .any(|cell| cell.trim().trim_matches('"').trim() == CONCLUSION_NUMBER)
}

/// Drops the banner above the header and the footer below the table. The
/// banner may contain the delimiter itself, so the header is recognized by
/// its key column rather than by the first delimited line.
fn strip_non_data_lines(payload: &str) -> Result<String, RegistryError> {
    let lines: Vec<_> = payload
        .trim_start_matches('\u{feff}')
        .lines()
        .filter(|line| !line.trim().is_empty() && line.contains(DELIMITER))
        .collect();

    if lines.is_empty() {
        return Ok(String::new());
    }

    let header = lines
        .iter()
        .position(|line| is_header_line(line))
        .ok_or_else(|| RegistryError::Parse {
            message: format!(
                "no header line with a `{CONCLUSION_NUMBER}` column, first line: {:?}",
                lines[0]
            ),
        })?;

    if header > 0 {
        debug!(skipped = header, "Skipped delimited banner lines above the header");
    }

    Ok(lines[header..]
        .iter()
        .fold(String::with_capacity(payload.len()), |mut acc, line| {
            acc.push_str(line);
            acc.push('\n');
            acc
        }))
}

/// Parses the `;`-delimited export. Rows that don't fit the header are
/// dropped, only a missing or unusable header fails the whole payload.
pub(crate) fn parse_export(payload: &str) -> Result<Vec<RawRecord>, RegistryError> {
    let table = strip_non_data_lines(payload)?;

    if table.is_empty() {
        return Ok(vec![]);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(DELIMITER as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(table.as_bytes());

    let header = reader
        .headers()
        .map_err(|err| RegistryError::Parse {
            message: format!("failed to read the header: {err}"),
        })?
        .clone();

    let columns = Columns::from_header(&header)?;

    let mut dropped = 0;
    let records: Vec<_> = reader
        .records()
        .filter_map(|row| {
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    debug!(err = tracing_err(&err), "Dropping malformed registry row");
                    dropped += 1;
                    return None;
                }
            };
            if row.len() != header.len() {
                debug!(
                    expected = header.len(),
                    actual = row.len(),
                    "Dropping registry row with a wrong number of columns"
                );
                dropped += 1;
                return None;
            }
            let record = columns.record(&row);
            if record.is_none() {
                dropped += 1;
            }
            record
        })
        .collect();

    if dropped > 0 {
        warn!(dropped, kept = records.len(), "Dropped malformed registry rows");
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use expect_test::expect;

    const HEADER: &str = "Номер заключения экспертизы;Результат экспертизы;\
        Сведения о лице, подготовившем проектную документацию;\
        Сведения о застройщике, техническом заказчике;\
        Наименование объекта;Адрес объекта;Дата заключения";

    #[test]
    fn parses_export_with_banner_and_footer() {
        let payload = format!(
            "\u{feff}Единый государственный реестр заключений\n\
            \n\
            {HEADER}\n\
            78-1-1-3-000001-2024;Положительное;ООО Проект;\"ООО Ромашка, ИНН 7801234567\";Жилой дом;г. Санкт-Петербург;05.03.2024\n\
            78-1-1-3-000002-2024;Отрицательное;ИП Иванов;не требуется;Склад;г. Санкт-Петербург;05.03.2024\n\
            \n\
            Выгружено записей: 2\n"
        );

        let records = parse_export(&payload).unwrap();

        expect![[r#"
            [
                RawRecord {
                    conclusion_number: ConclusionNumber(
                        "78-1-1-3-000001-2024",
                    ),
                    expertise_result: "Положительное",
                    preparer: "ООО Проект",
                    developer: "ООО Ромашка, ИНН 7801234567",
                    object_name: "Жилой дом",
                    object_address: "г. Санкт-Петербург",
                    conclusion_date: "05.03.2024",
                },
                RawRecord {
                    conclusion_number: ConclusionNumber(
                        "78-1-1-3-000002-2024",
                    ),
                    expertise_result: "Отрицательное",
                    preparer: "ИП Иванов",
                    developer: "не требуется",
                    object_name: "Склад",
                    object_address: "г. Санкт-Петербург",
                    conclusion_date: "05.03.2024",
                },
            ]
        "#]]
        .assert_debug_eq(&records);
    }

    #[test]
    fn drops_malformed_rows() {
        let payload = format!(
            "{HEADER}\n\
            A-1;Положительное;П;З;О;Адрес;01.01.2024\n\
            A-2;only;three\n\
            ;Положительное;П;З;О;Адрес;01.01.2024\n\
            A-3;Положительное;П;З;О;Адрес;01.01.2024;extra\n\
            A-4;Положительное;П;З;О;Адрес;01.01.2024\n"
        );

        let numbers: Vec<_> = parse_export(&payload)
            .unwrap()
            .into_iter()
            .map(|record| record.conclusion_number.to_string())
            .collect();

        assert_eq!(numbers, ["A-1", "A-4"]);
    }

    #[test]
    fn missing_conclusion_number_column_is_parse_error() {
        let payload = "Результат экспертизы;Адрес объекта\nПоложительное;Москва\n";
        assert_matches!(parse_export(payload), Err(RegistryError::Parse { .. }));
    }

    #[test]
    fn delimited_banner_is_skipped() {
        let payload = format!(
            "Реестр заключений; выгрузка от 05.03.2024\n\
            Регион;Санкт-Петербург\n\
            {HEADER}\n\
            78-1;Положительное;П;З;О;Адрес;05.03.2024\n"
        );

        let numbers: Vec<_> = parse_export(&payload)
            .unwrap()
            .into_iter()
            .map(|record| record.conclusion_number.to_string())
            .collect();

        assert_eq!(numbers, ["78-1"]);
    }

    #[test]
    fn empty_payload_has_no_records() {
        assert_eq!(parse_export("").unwrap(), vec![]);
        assert_eq!(parse_export("Нет данных\n\n").unwrap(), vec![]);
    }
}
