//! Typed GeoIP2 and GeoLite2 records
//!
//! Record models for the MaxMind database families and [`Reader`] methods
//! that look an address up and bind the record in one call. Each method
//! checks the database type first, so asking a country database for ISP
//! data is an error rather than an empty record.
//!
//! ```no_run
//! use mmdb_reader::Reader;
//!
//! let reader = Reader::open("GeoIP2-City.mmdb")?;
//! let city = reader.city("81.2.69.160".parse().unwrap())?;
//! println!("{:?} in {}", city.city.names.get("en"), city.country.iso_code);
//! # Ok::<(), mmdb_reader::MmdbError>(())
//! ```
//!
//! Addresses without a record bind to the record's default value.

use crate::database::Reader;
use crate::error::{MmdbError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Localized names keyed by locale code
pub type Names = BTreeMap<String, String>;

/// Continent of a location
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Continent {
    /// Two-letter continent code, e.g. `EU`
    pub code: String,
    /// GeoNames id
    pub geoname_id: u32,
    /// Localized names
    pub names: Names,
}

/// A country record
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CountryRecord {
    /// GeoNames id
    pub geoname_id: u32,
    /// Whether the country is a member state of the European Union
    pub is_in_european_union: bool,
    /// ISO 3166-1 alpha-2 code
    pub iso_code: String,
    /// Localized names
    pub names: Names,
}

/// Country represented by users of the address, such as a military base
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RepresentedCountry {
    /// GeoNames id
    pub geoname_id: u32,
    /// Whether the country is a member state of the European Union
    pub is_in_european_union: bool,
    /// ISO 3166-1 alpha-2 code
    pub iso_code: String,
    /// Localized names
    pub names: Names,
    /// Kind of entity, e.g. `military`
    #[serde(rename = "type")]
    pub kind: String,
}

/// A city record
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CityRecord {
    /// GeoNames id
    pub geoname_id: u32,
    /// Localized names
    pub names: Names,
}

/// Approximate location of an address
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Location {
    /// Radius in kilometers around the coordinates
    pub accuracy_radius: u16,
    /// Degrees north, negative for south
    pub latitude: f64,
    /// Degrees east, negative for west
    pub longitude: f64,
    /// US metro code
    pub metro_code: u16,
    /// IANA time zone, e.g. `Europe/London`
    pub time_zone: String,
}

/// Postal code of a location
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Postal {
    /// Postal code, possibly truncated, e.g. the first three characters in Canada
    pub code: String,
}

/// A first- or second-level subdivision
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Subdivision {
    /// GeoNames id
    pub geoname_id: u32,
    /// ISO 3166-2 subdivision code without the country prefix
    pub iso_code: String,
    /// Localized names
    pub names: Names,
}

/// Flags about an address in City and Country databases
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Traits {
    /// Deprecated by MaxMind in favour of the Anonymous IP database
    pub is_anonymous_proxy: bool,
    /// Address belongs to an anycast network
    pub is_anycast: bool,
    /// Deprecated; satellite providers serve several countries
    pub is_satellite_provider: bool,
}

/// Record of a City database
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct City {
    /// City of the address
    pub city: CityRecord,
    /// Continent of the address
    pub continent: Continent,
    /// Country where the address is located
    pub country: CountryRecord,
    /// Coordinates and time zone
    pub location: Location,
    /// Postal code
    pub postal: Postal,
    /// Country the ISP registered the network in
    pub registered_country: CountryRecord,
    /// Country represented by the users, when it differs from `country`
    pub represented_country: RepresentedCountry,
    /// Most general first
    pub subdivisions: Vec<Subdivision>,
    /// Network flags
    pub traits: Traits,
}

/// Record of a Country database
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Country {
    /// Continent of the address
    pub continent: Continent,
    /// Country where the address is located
    pub country: CountryRecord,
    /// Country the ISP registered the network in
    pub registered_country: CountryRecord,
    /// Country represented by the users, when it differs from `country`
    pub represented_country: RepresentedCountry,
    /// Network flags
    pub traits: Traits,
}

// Enterprise records add confidence scores (0-100) to most sub-records.

/// City record with a confidence score
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnterpriseCityRecord {
    /// Confidence that the city is correct
    pub confidence: u8,
    /// GeoNames id
    pub geoname_id: u32,
    /// Localized names
    pub names: Names,
}

/// Country record with a confidence score
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnterpriseCountryRecord {
    /// Confidence that the country is correct
    pub confidence: u8,
    /// GeoNames id
    pub geoname_id: u32,
    /// Whether the country is a member state of the European Union
    pub is_in_european_union: bool,
    /// ISO 3166-1 alpha-2 code
    pub iso_code: String,
    /// Localized names
    pub names: Names,
}

/// Postal code with a confidence score
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnterprisePostal {
    /// Postal code
    pub code: String,
    /// Confidence that the postal code is correct
    pub confidence: u8,
}

/// Subdivision with a confidence score
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnterpriseSubdivision {
    /// Confidence that the subdivision is correct
    pub confidence: u8,
    /// GeoNames id
    pub geoname_id: u32,
    /// ISO 3166-2 subdivision code without the country prefix
    pub iso_code: String,
    /// Localized names
    pub names: Names,
}

/// Network and ownership details in Enterprise databases
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnterpriseTraits {
    /// Autonomous system number
    pub autonomous_system_number: u32,
    /// Organization that owns the autonomous system
    pub autonomous_system_organization: String,
    /// e.g. `Cable/DSL`, `Cellular`
    pub connection_type: String,
    /// Second-level domain of the reverse DNS name
    pub domain: String,
    /// Name of the ISP
    pub isp: String,
    /// Mobile country code (MCC)
    pub mobile_country_code: String,
    /// Mobile network code (MNC)
    pub mobile_network_code: String,
    /// Organization the address is assigned to
    pub organization: String,
    /// 0 to 99.99; higher means the address is more likely static
    pub static_ip_score: f64,
    /// e.g. `residential`, `business`, `cellular`
    pub user_type: String,
    /// Deprecated by MaxMind in favour of the Anonymous IP database
    pub is_anonymous_proxy: bool,
    /// Address belongs to an anycast network
    pub is_anycast: bool,
    /// Proxy run by a known, legitimate operator such as a corporate VPN
    pub is_legitimate_proxy: bool,
    /// Deprecated; satellite providers serve several countries
    pub is_satellite_provider: bool,
}

/// Record of an Enterprise database
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Enterprise {
    /// City of the address
    pub city: EnterpriseCityRecord,
    /// Continent of the address
    pub continent: Continent,
    /// Country where the address is located
    pub country: EnterpriseCountryRecord,
    /// Coordinates and time zone
    pub location: Location,
    /// Postal code
    pub postal: EnterprisePostal,
    /// Country the ISP registered the network in
    pub registered_country: EnterpriseCountryRecord,
    /// Country represented by the users, when it differs from `country`
    pub represented_country: RepresentedCountry,
    /// Most general first
    pub subdivisions: Vec<EnterpriseSubdivision>,
    /// Network and ownership details
    pub traits: EnterpriseTraits,
}

/// Record of an Anonymous IP database
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnonymousIp {
    /// Set when any of the other flags is set
    pub is_anonymous: bool,
    /// Registered to an anonymous VPN provider
    pub is_anonymous_vpn: bool,
    /// Belongs to a hosting or VPN provider
    pub is_hosting_provider: bool,
    /// Open public proxy
    pub is_public_proxy: bool,
    /// Residential proxy, often suspicious traffic
    pub is_residential_proxy: bool,
    /// Tor exit node
    pub is_tor_exit_node: bool,
}

/// Record of an ASN database
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Asn {
    /// Autonomous system number
    pub autonomous_system_number: u32,
    /// Organization that owns the autonomous system
    pub autonomous_system_organization: String,
}

/// Record of a Connection Type database
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionType {
    /// e.g. `Cable/DSL`, `Cellular`, `Corporate`
    pub connection_type: String,
}

/// Record of a Domain database
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Domain {
    /// Second-level domain, e.g. `example.com`
    pub domain: String,
}

/// Record of an ISP database
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Isp {
    /// Autonomous system number
    pub autonomous_system_number: u32,
    /// Organization that owns the autonomous system
    pub autonomous_system_organization: String,
    /// Name of the ISP
    pub isp: String,
    /// Mobile country code (MCC)
    pub mobile_country_code: String,
    /// Mobile network code (MNC)
    pub mobile_network_code: String,
    /// Organization the address is assigned to
    pub organization: String,
}

/// Record families a database type can answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Capabilities(u8);

impl Capabilities {
    const NONE: Self = Self(0);
    const ANONYMOUS_IP: Self = Self(1 << 0);
    const ASN: Self = Self(1 << 1);
    const CITY: Self = Self(1 << 2);
    const CONNECTION_TYPE: Self = Self(1 << 3);
    const COUNTRY: Self = Self(1 << 4);
    const DOMAIN: Self = Self(1 << 5);
    const ENTERPRISE: Self = Self(1 << 6);
    const ISP: Self = Self(1 << 7);

    const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// City lookups are allowed on Country databases; the extra fields are
    /// simply absent.
    fn for_database_type(database_type: &str) -> Self {
        match database_type {
            "GeoIP2-Anonymous-IP" => Self::ANONYMOUS_IP,
            "DBIP-ASN-Lite" | "DBIP-ASN-Lite (compat=GeoLite2-ASN)" | "GeoLite2-ASN" => Self::ASN,
            "DBIP-City-Lite"
            | "DBIP-Country-Lite"
            | "DBIP-Country"
            | "DBIP-Location (compat=City)"
            | "GeoLite2-City"
            | "GeoIP-City-Redacted-US"
            | "GeoIP2-City"
            | "GeoIP2-City-Africa"
            | "GeoIP2-City-Asia-Pacific"
            | "GeoIP2-City-Europe"
            | "GeoIP2-City-North-America"
            | "GeoIP2-City-South-America"
            | "GeoIP2-Precision-City"
            | "GeoLite2-Country"
            | "GeoIP2-Country" => Self::CITY.union(Self::COUNTRY),
            "GeoIP2-Connection-Type" => Self::CONNECTION_TYPE,
            "GeoIP2-Domain" => Self::DOMAIN,
            "DBIP-ISP (compat=Enterprise)"
            | "DBIP-Location-ISP (compat=Enterprise)"
            | "GeoIP2-Enterprise" => Self::ENTERPRISE.union(Self::CITY).union(Self::COUNTRY),
            "GeoIP2-ISP" | "GeoIP2-Precision-ISP" => Self::ISP.union(Self::ASN),
            _ => Self::NONE,
        }
    }
}

impl Reader {
    fn lookup_typed<T>(&self, ip: IpAddr, method: &str, required: Capabilities) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let database_type = &self.metadata().database_type;
        if !Capabilities::for_database_type(database_type).contains(required) {
            return Err(MmdbError::UnsupportedMethod(format!(
                "geoip2: the {} method does not support the {} database",
                method, database_type
            )));
        }
        Ok(self.lookup(ip).decode()?.unwrap_or_default())
    }

    /// City record for `ip`; also works on Country and Enterprise databases
    pub fn city(&self, ip: IpAddr) -> Result<City> {
        self.lookup_typed(ip, "City", Capabilities::CITY)
    }

    /// Country record for `ip`
    pub fn country(&self, ip: IpAddr) -> Result<Country> {
        self.lookup_typed(ip, "Country", Capabilities::COUNTRY)
    }

    /// Enterprise record for `ip`
    pub fn enterprise(&self, ip: IpAddr) -> Result<Enterprise> {
        self.lookup_typed(ip, "Enterprise", Capabilities::ENTERPRISE)
    }

    /// Anonymous IP record for `ip`
    pub fn anonymous_ip(&self, ip: IpAddr) -> Result<AnonymousIp> {
        self.lookup_typed(ip, "AnonymousIP", Capabilities::ANONYMOUS_IP)
    }

    /// ASN record for `ip`; also works on ISP databases
    pub fn asn(&self, ip: IpAddr) -> Result<Asn> {
        self.lookup_typed(ip, "ASN", Capabilities::ASN)
    }

    /// Connection type record for `ip`
    pub fn connection_type(&self, ip: IpAddr) -> Result<ConnectionType> {
        self.lookup_typed(ip, "ConnectionType", Capabilities::CONNECTION_TYPE)
    }

    /// Domain record for `ip`
    pub fn domain(&self, ip: IpAddr) -> Result<Domain> {
        self.lookup_typed(ip, "Domain", Capabilities::DOMAIN)
    }

    /// ISP record for `ip`
    pub fn isp(&self, ip: IpAddr) -> Result<Isp> {
        self.lookup_typed(ip, "ISP", Capabilities::ISP)
    }
}
