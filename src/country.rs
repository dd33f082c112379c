//! ISO 3166-1 country code resolution.
//!
//! Resolves free-form country hints ("gb", "GBR", "United Kingdom", "uk")
//! to a lowercase alpha-2 code.

use hashbrown::HashMap;
use once_cell::sync::Lazy;

use crate::normalize::normalize;

/// (alpha-2, alpha-3, English short name)
const COUNTRIES: &[(&str, &str, &str)] = &[
    ("ad", "and", "Andorra"),
    ("ae", "are", "United Arab Emirates"),
    ("af", "afg", "Afghanistan"),
    ("ag", "atg", "Antigua and Barbuda"),
    ("ai", "aia", "Anguilla"),
    ("al", "alb", "Albania"),
    ("am", "arm", "Armenia"),
    ("ao", "ago", "Angola"),
    ("aq", "ata", "Antarctica"),
    ("ar", "arg", "Argentina"),
    ("as", "asm", "American Samoa"),
    ("at", "aut", "Austria"),
    ("au", "aus", "Australia"),
    ("aw", "abw", "Aruba"),
    ("ax", "ala", "Aland Islands"),
    ("az", "aze", "Azerbaijan"),
    ("ba", "bih", "Bosnia and Herzegovina"),
    ("bb", "brb", "Barbados"),
    ("bd", "bgd", "Bangladesh"),
    ("be", "bel", "Belgium"),
    ("bf", "bfa", "Burkina Faso"),
    ("bg", "bgr", "Bulgaria"),
    ("bh", "bhr", "Bahrain"),
    ("bi", "bdi", "Burundi"),
    ("bj", "ben", "Benin"),
    ("bl", "blm", "Saint Barthelemy"),
    ("bm", "bmu", "Bermuda"),
    ("bn", "brn", "Brunei"),
    ("bo", "bol", "Bolivia"),
    ("bq", "bes", "Bonaire, Sint Eustatius and Saba"),
    ("br", "bra", "Brazil"),
    ("bs", "bhs", "Bahamas"),
    ("bt", "btn", "Bhutan"),
    ("bv", "bvt", "Bouvet Island"),
    ("bw", "bwa", "Botswana"),
    ("by", "blr", "Belarus"),
    ("bz", "blz", "Belize"),
    ("ca", "can", "Canada"),
    ("cc", "cck", "Cocos (Keeling) Islands"),
    ("cd", "cod", "Democratic Republic of the Congo"),
    ("cf", "caf", "Central African Republic"),
    ("cg", "cog", "Congo"),
    ("ch", "che", "Switzerland"),
    ("ci", "civ", "Cote d'Ivoire"),
    ("ck", "cok", "Cook Islands"),
    ("cl", "chl", "Chile"),
    ("cm", "cmr", "Cameroon"),
    ("cn", "chn", "China"),
    ("co", "col", "Colombia"),
    ("cr", "cri", "Costa Rica"),
    ("cu", "cub", "Cuba"),
    ("cv", "cpv", "Cabo Verde"),
    ("cw", "cuw", "Curacao"),
    ("cx", "cxr", "Christmas Island"),
    ("cy", "cyp", "Cyprus"),
    ("cz", "cze", "Czechia"),
    ("de", "deu", "Germany"),
    ("dj", "dji", "Djibouti"),
    ("dk", "dnk", "Denmark"),
    ("dm", "dma", "Dominica"),
    ("do", "dom", "Dominican Republic"),
    ("dz", "dza", "Algeria"),
    ("ec", "ecu", "Ecuador"),
    ("ee", "est", "Estonia"),
    ("eg", "egy", "Egypt"),
    ("eh", "esh", "Western Sahara"),
    ("er", "eri", "Eritrea"),
    ("es", "esp", "Spain"),
    ("et", "eth", "Ethiopia"),
    ("fi", "fin", "Finland"),
    ("fj", "fji", "Fiji"),
    ("fk", "flk", "Falkland Islands"),
    ("fm", "fsm", "Micronesia"),
    ("fo", "fro", "Faroe Islands"),
    ("fr", "fra", "France"),
    ("ga", "gab", "Gabon"),
    ("gb", "gbr", "United Kingdom"),
    ("gd", "grd", "Grenada"),
    ("ge", "geo", "Georgia"),
    ("gf", "guf", "French Guiana"),
    ("gg", "ggy", "Guernsey"),
    ("gh", "gha", "Ghana"),
    ("gi", "gib", "Gibraltar"),
    ("gl", "grl", "Greenland"),
    ("gm", "gmb", "Gambia"),
    ("gn", "gin", "Guinea"),
    ("gp", "glp", "Guadeloupe"),
    ("gq", "gnq", "Equatorial Guinea"),
    ("gr", "grc", "Greece"),
    ("gs", "sgs", "South Georgia and the South Sandwich Islands"),
    ("gt", "gtm", "Guatemala"),
    ("gu", "gum", "Guam"),
    ("gw", "gnb", "Guinea-Bissau"),
    ("gy", "guy", "Guyana"),
    ("hk", "hkg", "Hong Kong"),
    ("hm", "hmd", "Heard Island and McDonald Islands"),
    ("hn", "hnd", "Honduras"),
    ("hr", "hrv", "Croatia"),
    ("ht", "hti", "Haiti"),
    ("hu", "hun", "Hungary"),
    ("id", "idn", "Indonesia"),
    ("ie", "irl", "Ireland"),
    ("il", "isr", "Israel"),
    ("im", "imn", "Isle of Man"),
    ("in", "ind", "India"),
    ("io", "iot", "British Indian Ocean Territory"),
    ("iq", "irq", "Iraq"),
    ("ir", "irn", "Iran"),
    ("is", "isl", "Iceland"),
    ("it", "ita", "Italy"),
    ("je", "jey", "Jersey"),
    ("jm", "jam", "Jamaica"),
    ("jo", "jor", "Jordan"),
    ("jp", "jpn", "Japan"),
    ("ke", "ken", "Kenya"),
    ("kg", "kgz", "Kyrgyzstan"),
    ("kh", "khm", "Cambodia"),
    ("ki", "kir", "Kiribati"),
    ("km", "com", "Comoros"),
    ("kn", "kna", "Saint Kitts and Nevis"),
    ("kp", "prk", "North Korea"),
    ("kr", "kor", "South Korea"),
    ("kw", "kwt", "Kuwait"),
    ("ky", "cym", "Cayman Islands"),
    ("kz", "kaz", "Kazakhstan"),
    ("la", "lao", "Laos"),
    ("lb", "lbn", "Lebanon"),
    ("lc", "lca", "Saint Lucia"),
    ("li", "lie", "Liechtenstein"),
    ("lk", "lka", "Sri Lanka"),
    ("lr", "lbr", "Liberia"),
    ("ls", "lso", "Lesotho"),
    ("lt", "ltu", "Lithuania"),
    ("lu", "lux", "Luxembourg"),
    ("lv", "lva", "Latvia"),
    ("ly", "lby", "Libya"),
    ("ma", "mar", "Morocco"),
    ("mc", "mco", "Monaco"),
    ("md", "mda", "Moldova"),
    ("me", "mne", "Montenegro"),
    ("mf", "maf", "Saint Martin"),
    ("mg", "mdg", "Madagascar"),
    ("mh", "mhl", "Marshall Islands"),
    ("mk", "mkd", "North Macedonia"),
    ("ml", "mli", "Mali"),
    ("mm", "mmr", "Myanmar"),
    ("mn", "mng", "Mongolia"),
    ("mo", "mac", "Macao"),
    ("mp", "mnp", "Northern Mariana Islands"),
    ("mq", "mtq", "Martinique"),
    ("mr", "mrt", "Mauritania"),
    ("ms", "msr", "Montserrat"),
    ("mt", "mlt", "Malta"),
    ("mu", "mus", "Mauritius"),
    ("mv", "mdv", "Maldives"),
    ("mw", "mwi", "Malawi"),
    ("mx", "mex", "Mexico"),
    ("my", "mys", "Malaysia"),
    ("mz", "moz", "Mozambique"),
    ("na", "nam", "Namibia"),
    ("nc", "ncl", "New Caledonia"),
    ("ne", "ner", "Niger"),
    ("nf", "nfk", "Norfolk Island"),
    ("ng", "nga", "Nigeria"),
    ("ni", "nic", "Nicaragua"),
    ("nl", "nld", "Netherlands"),
    ("no", "nor", "Norway"),
    ("np", "npl", "Nepal"),
    ("nr", "nru", "Nauru"),
    ("nu", "niu", "Niue"),
    ("nz", "nzl", "New Zealand"),
    ("om", "omn", "Oman"),
    ("pa", "pan", "Panama"),
    ("pe", "per", "Peru"),
    ("pf", "pyf", "French Polynesia"),
    ("pg", "png", "Papua New Guinea"),
    ("ph", "phl", "Philippines"),
    ("pk", "pak", "Pakistan"),
    ("pl", "pol", "Poland"),
    ("pm", "spm", "Saint Pierre and Miquelon"),
    ("pn", "pcn", "Pitcairn"),
    ("pr", "pri", "Puerto Rico"),
    ("ps", "pse", "Palestine"),
    ("pt", "prt", "Portugal"),
    ("pw", "plw", "Palau"),
    ("py", "pry", "Paraguay"),
    ("qa", "qat", "Qatar"),
    ("re", "reu", "Reunion"),
    ("ro", "rou", "Romania"),
    ("rs", "srb", "Serbia"),
    ("ru", "rus", "Russia"),
    ("rw", "rwa", "Rwanda"),
    ("sa", "sau", "Saudi Arabia"),
    ("sb", "slb", "Solomon Islands"),
    ("sc", "syc", "Seychelles"),
    ("sd", "sdn", "Sudan"),
    ("se", "swe", "Sweden"),
    ("sg", "sgp", "Singapore"),
    ("sh", "shn", "Saint Helena"),
    ("si", "svn", "Slovenia"),
    ("sj", "sjm", "Svalbard and Jan Mayen"),
    ("sk", "svk", "Slovakia"),
    ("sl", "sle", "Sierra Leone"),
    ("sm", "smr", "San Marino"),
    ("sn", "sen", "Senegal"),
    ("so", "som", "Somalia"),
    ("sr", "sur", "Suriname"),
    ("ss", "ssd", "South Sudan"),
    ("st", "stp", "Sao Tome and Principe"),
    ("sv", "slv", "El Salvador"),
    ("sx", "sxm", "Sint Maarten"),
    ("sy", "syr", "Syria"),
    ("sz", "swz", "Eswatini"),
    ("tc", "tca", "Turks and Caicos Islands"),
    ("td", "tcd", "Chad"),
    ("tf", "atf", "French Southern Territories"),
    ("tg", "tgo", "Togo"),
    ("th", "tha", "Thailand"),
    ("tj", "tjk", "Tajikistan"),
    ("tk", "tkl", "Tokelau"),
    ("tl", "tls", "Timor-Leste"),
    ("tm", "tkm", "Turkmenistan"),
    ("tn", "tun", "Tunisia"),
    ("to", "ton", "Tonga"),
    ("tr", "tur", "Turkey"),
    ("tt", "tto", "Trinidad and Tobago"),
    ("tv", "tuv", "Tuvalu"),
    ("tw", "twn", "Taiwan"),
    ("tz", "tza", "Tanzania"),
    ("ua", "ukr", "Ukraine"),
    ("ug", "uga", "Uganda"),
    ("um", "umi", "United States Minor Outlying Islands"),
    ("us", "usa", "United States"),
    ("uy", "ury", "Uruguay"),
    ("uz", "uzb", "Uzbekistan"),
    ("va", "vat", "Holy See"),
    ("vc", "vct", "Saint Vincent and the Grenadines"),
    ("ve", "ven", "Venezuela"),
    ("vg", "vgb", "British Virgin Islands"),
    ("vi", "vir", "U.S. Virgin Islands"),
    ("vn", "vnm", "Vietnam"),
    ("vu", "vut", "Vanuatu"),
    ("wf", "wlf", "Wallis and Futuna"),
    ("ws", "wsm", "Samoa"),
    ("xk", "xkx", "Kosovo"),
    ("ye", "yem", "Yemen"),
    ("yt", "myt", "Mayotte"),
    ("za", "zaf", "South Africa"),
    ("zm", "zmb", "Zambia"),
    ("zw", "zwe", "Zimbabwe"),
];

/// Names and codes in common use that are not ISO alpha codes or short names.
const ALIASES: &[(&str, &str)] = &[
    ("uk", "gb"),
    ("great britain", "gb"),
    ("britain", "gb"),
    ("england", "gb"),
    ("scotland", "gb"),
    ("wales", "gb"),
    ("northern ireland", "gb"),
    ("united kingdom of great britain and northern ireland", "gb"),
    ("el", "gr"),
    ("hellas", "gr"),
    ("usa", "us"),
    ("united states of america", "us"),
    ("america", "us"),
    ("russian federation", "ru"),
    ("czech republic", "cz"),
    ("the netherlands", "nl"),
    ("holland", "nl"),
    ("deutschland", "de"),
    ("espana", "es"),
    ("italia", "it"),
    ("osterreich", "at"),
    ("schweiz", "ch"),
    ("suisse", "ch"),
    ("republic of korea", "kr"),
    ("korea", "kr"),
    ("ivory coast", "ci"),
    ("swaziland", "sz"),
    ("macedonia", "mk"),
    ("turkiye", "tr"),
    ("burma", "mm"),
    ("cape verde", "cv"),
    ("east timor", "tl"),
    ("vatican", "va"),
    ("vatican city", "va"),
    ("uae", "ae"),
];

static LOOKUP: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(COUNTRIES.len() * 3 + ALIASES.len());
    for (alpha2, alpha3, name) in COUNTRIES {
        map.insert(alpha2.to_string(), *alpha2);
        map.insert(alpha3.to_string(), *alpha2);
        map.insert(normalize(name), *alpha2);
    }
    for (alias, alpha2) in ALIASES {
        map.insert(normalize(alias), *alpha2);
    }
    map
});

/// Resolve a country hint to a lowercase ISO alpha-2 code.
pub fn country_code(value: &str) -> Option<&'static str> {
    let key = normalize(value);
    if key.is_empty() {
        return None;
    }
    LOOKUP.get(&key).copied()
}

/// English short name for an alpha-2 code.
pub fn country_name(code: &str) -> Option<&'static str> {
    let code = code.trim().to_ascii_lowercase();
    COUNTRIES
        .iter()
        .find(|(alpha2, _, _)| *alpha2 == code)
        .map(|(_, _, name)| *name)
}

/// Map a NUTS country prefix to ISO alpha-2. NUTS uses `UK` and `EL` where
/// ISO uses `GB` and `GR`.
pub fn nuts_country_code(nuts_prefix: &str) -> Option<&'static str> {
    match nuts_prefix.to_ascii_uppercase().as_str() {
        "UK" => Some("gb"),
        "EL" => Some("gr"),
        other => country_code(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_names() {
        assert_eq!(country_code("gb"), Some("gb"));
        assert_eq!(country_code("GB"), Some("gb"));
        assert_eq!(country_code("GBR"), Some("gb"));
        assert_eq!(country_code("United Kingdom"), Some("gb"));
        assert_eq!(country_code("  united   kingdom "), Some("gb"));
        assert_eq!(country_code("UK"), Some("gb"));
        assert_eq!(country_code("Côte d'Ivoire"), Some("ci"));
        assert_eq!(country_code("Deutschland"), Some("de"));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(country_code(""), None);
        assert_eq!(country_code("   "), None);
        assert_eq!(country_code("Atlantis"), None);
        assert_eq!(country_code("zz"), None);
    }

    #[test]
    fn test_nuts_prefixes() {
        assert_eq!(nuts_country_code("UK"), Some("gb"));
        assert_eq!(nuts_country_code("EL"), Some("gr"));
        assert_eq!(nuts_country_code("DE"), Some("de"));
        assert_eq!(country_name("de"), Some("Germany"));
    }
}
