//! Currency model and the catalog of known currencies

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyClass {
    /// Quoted as units of this currency per one unit of the base.
    Fiat,
    /// Quoted as units of the base per one coin.
    Crypto,
}

impl Display for CurrencyClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurrencyClass::Fiat => write!(f, "fiat"),
            CurrencyClass::Crypto => write!(f, "crypto"),
        }
    }
}

impl FromStr for CurrencyClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fiat" => Ok(CurrencyClass::Fiat),
            "crypto" => Ok(CurrencyClass::Crypto),
            _ => Err(anyhow::anyhow!("Invalid currency class: {}", s)),
        }
    }
}

/// A selectable currency. Identity is the code alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Currency {
    #[serde(deserialize_with = "deserialize_code")]
    pub code: String,
    pub name: String,
    #[serde(alias = "type")]
    pub class: CurrencyClass,
}

fn deserialize_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let code = String::deserialize(deserializer)?;
    Ok(normalize_code(&code))
}

/// Canonical form of a currency code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl Currency {
    pub fn new(code: &str, name: &str, class: CurrencyClass) -> Self {
        Self {
            code: normalize_code(code),
            name: name.to_string(),
            class,
        }
    }

    pub fn fiat(code: &str, name: &str) -> Self {
        Self::new(code, name, CurrencyClass::Fiat)
    }

    pub fn crypto(code: &str, name: &str) -> Self {
        Self::new(code, name, CurrencyClass::Crypto)
    }

    pub fn is_crypto(&self) -> bool {
        self.class == CurrencyClass::Crypto
    }
}

impl PartialEq for Currency {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Currency {}

impl Hash for Currency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code, self.name)
    }
}

const FIAT_CURRENCIES: &[(&str, &str)] = &[
    ("USD", "US Dollar"),
    ("EUR", "Euro"),
    ("GBP", "British Pound"),
    ("JPY", "Japanese Yen"),
    ("CHF", "Swiss Franc"),
    ("CNY", "Chinese Yuan"),
    ("CAD", "Canadian Dollar"),
    ("AUD", "Australian Dollar"),
    ("NZD", "New Zealand Dollar"),
    ("SEK", "Swedish Krona"),
    ("NOK", "Norwegian Krone"),
    ("DKK", "Danish Krone"),
    ("RUB", "Russian Ruble"),
    ("KZT", "Kazakhstani Tenge"),
    ("UAH", "Ukrainian Hryvnia"),
    ("BYN", "Belarusian Ruble"),
    ("GEL", "Georgian Lari"),
    ("AMD", "Armenian Dram"),
    ("AZN", "Azerbaijani Manat"),
    ("KGS", "Kyrgyzstani Som"),
    ("TJS", "Tajikistani Somoni"),
    ("TMT", "Turkmenistan Manat"),
    ("UZS", "Uzbekistani Som"),
    ("KRW", "South Korean Won"),
    ("HKD", "Hong Kong Dollar"),
    ("SGD", "Singapore Dollar"),
    ("THB", "Thai Baht"),
    ("MYR", "Malaysian Ringgit"),
    ("IDR", "Indonesian Rupiah"),
    ("PHP", "Philippine Peso"),
    ("VND", "Vietnamese Dong"),
    ("INR", "Indian Rupee"),
    ("PKR", "Pakistani Rupee"),
    ("BDT", "Bangladeshi Taka"),
    ("LKR", "Sri Lankan Rupee"),
    ("NPR", "Nepalese Rupee"),
    ("BTN", "Bhutanese Ngultrum"),
    ("MNT", "Mongolian Tugrik"),
    ("AED", "UAE Dirham"),
    ("SAR", "Saudi Riyal"),
    ("QAR", "Qatari Riyal"),
    ("KWD", "Kuwaiti Dinar"),
    ("BHD", "Bahraini Dinar"),
    ("OMR", "Omani Rial"),
    ("JOD", "Jordanian Dinar"),
    ("ILS", "Israeli Shekel"),
    ("TRY", "Turkish Lira"),
    ("EGP", "Egyptian Pound"),
    ("ZAR", "South African Rand"),
    ("NGN", "Nigerian Naira"),
    ("KES", "Kenyan Shilling"),
    ("GHS", "Ghanaian Cedi"),
    ("MAD", "Moroccan Dirham"),
    ("TND", "Tunisian Dinar"),
    ("DZD", "Algerian Dinar"),
    ("LYD", "Libyan Dinar"),
    ("PLN", "Polish Zloty"),
    ("CZK", "Czech Koruna"),
    ("HUF", "Hungarian Forint"),
    ("RON", "Romanian Leu"),
    ("BGN", "Bulgarian Lev"),
    ("HRK", "Croatian Kuna"),
    ("RSD", "Serbian Dinar"),
    ("BAM", "Bosnia-Herzegovina Convertible Mark"),
    ("MKD", "Macedonian Denar"),
    ("ALL", "Albanian Lek"),
    ("MDL", "Moldovan Leu"),
    ("ISK", "Icelandic Krona"),
    ("BRL", "Brazilian Real"),
    ("MXN", "Mexican Peso"),
    ("ARS", "Argentine Peso"),
    ("CLP", "Chilean Peso"),
    ("COP", "Colombian Peso"),
    ("PEN", "Peruvian Sol"),
    ("UYU", "Uruguayan Peso"),
    ("PYG", "Paraguayan Guarani"),
    ("BOB", "Bolivian Boliviano"),
    ("VES", "Venezuelan Bolívar"),
    ("IRR", "Iranian Rial"),
    ("IQD", "Iraqi Dinar"),
    ("AFN", "Afghan Afghani"),
    ("SYP", "Syrian Pound"),
    ("LBP", "Lebanese Pound"),
    ("YER", "Yemeni Rial"),
    ("JMD", "Jamaican Dollar"),
    ("BBD", "Barbadian Dollar"),
    ("BSD", "Bahamian Dollar"),
    ("XCD", "East Caribbean Dollar"),
    ("TTD", "Trinidad and Tobago Dollar"),
    ("FJD", "Fijian Dollar"),
    ("TOP", "Tongan Paʻanga"),
    ("WST", "Samoan Tala"),
    ("VUV", "Vanuatu Vatu"),
    ("PGK", "Papua New Guinean Kina"),
    ("ETB", "Ethiopian Birr"),
    ("UGX", "Ugandan Shilling"),
    ("TZS", "Tanzanian Shilling"),
    ("RWF", "Rwandan Franc"),
    ("BIF", "Burundian Franc"),
    ("DJF", "Djiboutian Franc"),
    ("SOS", "Somali Shilling"),
    ("ERN", "Eritrean Nakfa"),
    ("SDG", "Sudanese Pound"),
    ("SSP", "South Sudanese Pound"),
    ("CDF", "Congolese Franc"),
    ("XAF", "Central African CFA Franc"),
    ("XOF", "West African CFA Franc"),
    ("KMF", "Comorian Franc"),
    ("SCR", "Seychellois Rupee"),
    ("MUR", "Mauritian Rupee"),
    ("MGA", "Malagasy Ariary"),
    ("MZN", "Mozambican Metical"),
    ("ZMW", "Zambian Kwacha"),
    ("BWP", "Botswanan Pula"),
    ("NAD", "Namibian Dollar"),
    ("SZL", "Swazi Lilangeni"),
    ("LSL", "Lesotho Loti"),
];

const CRYPTO_CURRENCIES: &[(&str, &str)] = &[
    ("BTC", "Bitcoin"),
    ("ETH", "Ethereum"),
    ("BNB", "BNB"),
    ("XRP", "XRP"),
    ("ADA", "Cardano"),
    ("DOGE", "Dogecoin"),
    ("SOL", "Solana"),
    ("DOT", "Polkadot"),
    ("MATIC", "Polygon"),
    ("LTC", "Litecoin"),
    ("AVAX", "Avalanche"),
    ("LINK", "Chainlink"),
    ("UNI", "Uniswap"),
    ("ATOM", "Cosmos"),
    ("ICP", "Internet Computer"),
    ("BCH", "Bitcoin Cash"),
    ("XLM", "Stellar"),
    ("VET", "VeChain"),
    ("FIL", "Filecoin"),
    ("TRX", "TRON"),
    ("ETC", "Ethereum Classic"),
    ("XMR", "Monero"),
    ("ALGO", "Algorand"),
    ("HBAR", "Hedera"),
    ("NEAR", "NEAR Protocol"),
];

fn catalog(class: CurrencyClass) -> impl Iterator<Item = Currency> {
    let (entries, build): (&[(&str, &str)], fn(&str, &str) -> Currency) = match class {
        CurrencyClass::Fiat => (FIAT_CURRENCIES, Currency::fiat),
        CurrencyClass::Crypto => (CRYPTO_CURRENCIES, Currency::crypto),
    };
    entries.iter().map(move |(code, name)| build(code, name))
}

/// Looks up a known currency by code, case-insensitively.
pub fn find_currency(code: &str) -> Option<Currency> {
    let code = normalize_code(code);
    catalog(CurrencyClass::Fiat)
        .chain(catalog(CurrencyClass::Crypto))
        .find(|c| c.code == code)
}

/// All known currencies of a class, sorted by code.
pub fn currencies(class: CurrencyClass) -> Vec<Currency> {
    let mut all: Vec<Currency> = catalog(class).collect();
    all.sort_by(|a, b| a.code.cmp(&b.code));
    all
}

/// Case-insensitive search over code and name.
pub fn search(query: &str, class: Option<CurrencyClass>) -> Vec<Currency> {
    let candidates: Vec<Currency> = match class {
        Some(class) => currencies(class),
        None => catalog(CurrencyClass::Fiat)
            .chain(catalog(CurrencyClass::Crypto))
            .collect(),
    };

    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return candidates;
    }

    candidates
        .into_iter()
        .filter(|c| {
            c.code.to_lowercase().contains(&query) || c.name.to_lowercase().contains(&query)
        })
        .collect()
}
