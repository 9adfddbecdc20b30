//! Observation geometry helpers and the Cox–Munk sun-glint model

use std::f64::consts::PI;

/// Standard sea-level pressure (hPa)
pub const STANDARD_PRESSURE: f64 = 1013.25;

/// Atmospheric scale height used for the barometric formula (m)
pub const SCALE_HEIGHT: f64 = 8434.5;

/// Refractive index of sea water
pub const WATER_REFRACTIVE_INDEX: f64 = 1.34;

/// Relative azimuth between sun and view azimuths, folded to [0°, 180°]
///
/// Both azimuths are directions from the pixel; 180° puts the sensor in
/// the specular direction.
pub fn relative_azimuth(sun_azimuth: f64, view_azimuth: f64) -> f64 {
    let diff = (sun_azimuth - view_azimuth).abs() % 360.0;
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Surface pressure from terrain altitude (m) via p0 · exp(−z / H)
pub fn pressure_from_altitude(altitude: f64, sea_level_pressure: f64) -> f64 {
    sea_level_pressure * (-altitude / SCALE_HEIGHT).exp()
}

/// Top-of-atmosphere reflectance ρ = π·L / (E0 · cos θs)
pub fn radiance_to_reflectance(radiance: f64, solar_flux: f64, sun_zenith_deg: f64) -> f64 {
    let mu_s = sun_zenith_deg.to_radians().cos();
    if solar_flux <= 0.0 || mu_s <= 0.0 {
        return f64::NAN;
    }
    PI * radiance / (solar_flux * mu_s)
}

/// Fresnel reflectance of unpolarised light at incidence angle `omega` (rad)
pub fn fresnel_reflectance(omega: f64, n: f64) -> f64 {
    if omega.abs() < 1e-9 {
        let r = (n - 1.0) / (n + 1.0);
        return r * r;
    }
    let theta_t = (omega.sin() / n).asin();
    let rs = (omega - theta_t).sin() / (omega + theta_t).sin();
    let rp = (omega - theta_t).tan() / (omega + theta_t).tan();
    0.5 * (rs * rs + rp * rp)
}

/// Sun-glint reflectance for a wind-roughened sea (Cox & Munk 1954)
///
/// Isotropic slope variance σ² = 0.003 + 0.00512·W. Angles in degrees,
/// wind speed in m/s.
pub fn cox_munk_glint(sun_zenith: f64, view_zenith: f64, relative_azimuth: f64, wind_speed: f64) -> f64 {
    let ts = sun_zenith.to_radians();
    let tv = view_zenith.to_radians();
    let phi = relative_azimuth.to_radians();
    let (mu_s, mu_v) = (ts.cos(), tv.cos());
    if mu_s <= 0.0 || mu_v <= 0.0 || !wind_speed.is_finite() {
        return 0.0;
    }

    // s·v between the directions to sun and sensor; φ = 180° is specular
    let cos_2omega = (mu_s * mu_v + ts.sin() * tv.sin() * phi.cos()).clamp(-1.0, 1.0);
    let omega = 0.5 * cos_2omega.acos();
    let cos_beta = ((mu_s + mu_v) / (2.0 * omega.cos())).clamp(-1.0, 1.0);
    if cos_beta <= 0.0 {
        return 0.0;
    }

    let sigma2 = 0.003 + 0.00512 * wind_speed.max(0.0);
    let tan2_beta = (1.0 - cos_beta * cos_beta) / (cos_beta * cos_beta);
    let slope_pdf = (-tan2_beta / sigma2).exp() / (PI * sigma2);

    PI * fresnel_reflectance(omega, WATER_REFRACTIVE_INDEX) * slope_pdf
        / (4.0 * mu_s * mu_v * cos_beta.powi(4))
}
