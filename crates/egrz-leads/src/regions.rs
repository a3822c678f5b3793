//! Russian federal subjects as they are known to the registry.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Region identified by its display name and numeric code.
/// Serialized as `"Name - Code"`, e.g. `"Санкт-Петербург - 78"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub(crate) struct RegionLabel {
    // Code goes first to make the derived ordering follow the catalog
    code: u16,
    name: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid region label `{label}`, expected `Name - Code`")]
pub(crate) struct InvalidRegionLabel {
    label: String,
}

impl RegionLabel {
    pub(crate) fn new(name: impl Into<String>, code: u16) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn code(&self) -> u16 {
        self.code
    }
}

impl fmt::Display for RegionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {:02}", self.name, self.code)
    }
}

impl FromStr for RegionLabel {
    type Err = InvalidRegionLabel;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRegionLabel {
            label: label.to_owned(),
        };

        let (name, code) = label.trim().rsplit_once(" - ").ok_or_else(invalid)?;
        let name = name.trim();
        let code = code.trim();

        if name.is_empty() || code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let code = code.parse().map_err(|_| invalid())?;

        Ok(Self::new(name, code))
    }
}

impl TryFrom<String> for RegionLabel {
    type Error = InvalidRegionLabel;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        label.parse()
    }
}

impl From<RegionLabel> for String {
    fn from(label: RegionLabel) -> Self {
        label.to_string()
    }
}

const CATALOG: &[(u16, &str)] = &[
    (1, "Республика Адыгея"),
    (2, "Республика Башкортостан"),
    (3, "Республика Бурятия"),
    (4, "Республика Алтай"),
    (5, "Республика Дагестан"),
    (6, "Республика Ингушетия"),
    (7, "Кабардино-Балкарская Республика"),
    (8, "Республика Калмыкия"),
    (9, "Карачаево-Черкесская Республика"),
    (10, "Республика Карелия"),
    (11, "Республика Коми"),
    (12, "Республика Марий Эл"),
    (13, "Республика Мордовия"),
    (14, "Республика Саха (Якутия)"),
    (15, "Республика Северная Осетия-Алания"),
    (16, "Республика Татарстан"),
    (17, "Республика Тыва"),
    (18, "Удмуртская Республика"),
    (19, "Республика Хакасия"),
    (20, "Чеченская Республика"),
    (21, "Чувашская Республика"),
    (22, "Алтайский край"),
    (23, "Краснодарский край"),
    (24, "Красноярский край"),
    (25, "Приморский край"),
    (26, "Ставропольский край"),
    (27, "Хабаровский край"),
    (28, "Амурская область"),
    (29, "Архангельская область"),
    (30, "Астраханская область"),
    (31, "Белгородская область"),
    (32, "Брянская область"),
    (33, "Владимирская область"),
    (34, "Волгоградская область"),
    (35, "Вологодская область"),
    (36, "Воронежская область"),
    (37, "Ивановская область"),
    (38, "Иркутская область"),
    (39, "Калининградская область"),
    (40, "Калужская область"),
    (41, "Камчатский край"),
    (42, "Кемеровская область"),
    (43, "Кировская область"),
    (44, "Костромская область"),
    (45, "Курганская область"),
    (46, "Курская область"),
    (47, "Ленинградская область"),
    (48, "Липецкая область"),
    (49, "Магаданская область"),
    (50, "Московская область"),
    (51, "Мурманская область"),
    (52, "Нижегородская область"),
    (53, "Новгородская область"),
    (54, "Новосибирская область"),
    (55, "Омская область"),
    (56, "Оренбургская область"),
    (57, "Орловская область"),
    (58, "Пензенская область"),
    (59, "Пермский край"),
    (60, "Псковская область"),
    (61, "Ростовская область"),
    (62, "Рязанская область"),
    (63, "Самарская область"),
    (64, "Саратовская область"),
    (65, "Сахалинская область"),
    (66, "Свердловская область"),
    (67, "Смоленская область"),
    (68, "Тамбовская область"),
    (69, "Тверская область"),
    (70, "Томская область"),
    (71, "Тульская область"),
    (72, "Тюменская область"),
    (73, "Ульяновская область"),
    (74, "Челябинская область"),
    (75, "Забайкальский край"),
    (76, "Ярославская область"),
    (77, "Москва"),
    (78, "Санкт-Петербург"),
    (79, "Еврейская автономная область"),
    (83, "Ненецкий автономный округ"),
    (86, "Ханты-Мансийский автономный округ"),
    (87, "Чукотский автономный округ"),
    (89, "Ямало-Ненецкий автономный округ"),
    (91, "Республика Крым"),
    (92, "Севастополь"),
];

pub(crate) fn catalog() -> impl Iterator<Item = RegionLabel> {
    CATALOG
        .iter()
        .map(|&(code, name)| RegionLabel::new(name, code))
}

/// Resolves the user's input into a catalog region. The input may be
/// a bare code (`78`, `05`), a full label (`Санкт-Петербург - 78`)
/// or a case-insensitive name (`санкт-петербург`).
pub(crate) fn find(query: &str) -> Option<RegionLabel> {
    let query = query.trim();

    if let Ok(code) = query.parse::<u16>() {
        return catalog().find(|region| region.code() == code);
    }

    if let Ok(label) = query.parse::<RegionLabel>() {
        return catalog().find(|region| *region == label);
    }

    let query = query.to_lowercase();
    catalog().find(|region| region.name().to_lowercase() == query)
}
