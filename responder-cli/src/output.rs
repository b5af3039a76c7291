//! Output formatting for every command.
//!
//! Each `print_*` function writes either a human-readable block or, with
//! `--json`, the serialized record.

use anyhow::Context;
use serde::Serialize;
use serde_json::json;

use responder_core::{
    AirQuality, Eta, ForecastEntry, GeocodeResult, NearestResponder, ProviderConfig, RouteResult,
    WeatherSnapshot,
};

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

fn source(provider_tag: &str, is_simulated: bool) -> String {
    if is_simulated {
        "simulated (no provider available)".to_string()
    } else {
        provider_tag.to_string()
    }
}

pub fn print_providers(configs: &[ProviderConfig], json: bool) -> anyhow::Result<()> {
    if json {
        let rows: Vec<_> = configs
            .iter()
            .map(|c| {
                json!({
                    "provider": c.provider.as_str(),
                    "capability": c.capability.as_str(),
                    "enabled": c.enabled,
                    "credential_required": c.provider.requires_credential(),
                })
            })
            .collect();
        return print_json(&rows);
    }

    println!("{:<18} {:<10} STATUS", "PROVIDER", "CAPABILITY");
    for c in configs {
        let status = match (c.enabled, c.provider.requires_credential()) {
            (true, true) => "enabled".to_string(),
            (true, false) => "enabled (no key needed)".to_string(),
            (false, true) => match c.provider.env_key() {
                Some(env) => format!("disabled (set {env} or run `responder configure {}`)", c.provider),
                None => "disabled".to_string(),
            },
            (false, false) => "disabled in settings".to_string(),
        };
        println!("{:<18} {:<10} {status}", c.provider.as_str(), c.capability.as_str());
    }
    Ok(())
}

fn print_route_block(route: &RouteResult, eta: &Eta) {
    if let Some(name) = &route.route_name {
        println!("{name}");
    }
    println!("  From:      {}", route.start_label);
    println!("  To:        {}", route.end_label);
    println!("  Distance:  {:.2} km", route.distance_km);
    match route.duration_in_traffic_min {
        Some(traffic) => {
            println!("  Duration:  {:.1} min ({traffic:.1} min in traffic)", route.duration_min)
        }
        None => println!("  Duration:  {:.1} min", route.duration_min),
    }
    println!("  ETA:       {}", eta.formatted);
    println!("  Source:    {}", source(&route.provider_tag, route.is_simulated));

    if !route.turn_steps.is_empty() {
        println!("  Steps:");
        for step in &route.turn_steps {
            println!("    - {} ({:.2} km)", step.instruction, step.distance_km);
        }
    }
    for warning in &route.warnings {
        println!("  Warning:   {warning}");
    }
}

pub fn print_routes(routes: &[RouteResult], etas: &[Eta], json: bool) -> anyhow::Result<()> {
    if json {
        let rows: Vec<_> = routes
            .iter()
            .zip(etas)
            .map(|(route, eta)| json!({ "route": route, "eta": eta }))
            .collect();
        return print_json(&rows);
    }

    for (i, (route, eta)) in routes.iter().zip(etas).enumerate() {
        if i > 0 {
            println!();
        }
        print_route_block(route, eta);
    }
    Ok(())
}

pub fn print_nearest(nearest: &NearestResponder, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(nearest);
    }

    println!("Nearest responder: #{} at {}", nearest.responder_id, nearest.coordinate);
    print_route_block(&nearest.route, &nearest.eta);
    Ok(())
}

pub fn print_geocode(result: &GeocodeResult, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(result);
    }

    println!("{}", result.formatted_address);
    println!("  Coordinates: {}", result.coordinate);
    if !result.city.is_empty() {
        println!("  City:        {}", result.city);
    }
    if !result.country.is_empty() || !result.country_code.is_empty() {
        println!("  Country:     {} ({})", result.country, result.country_code);
    }
    println!("  Confidence:  {}", result.confidence);
    println!("  Source:      {}", source(&result.provider_tag, result.is_simulated));
    Ok(())
}

pub fn print_weather(weather: &WeatherSnapshot, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(weather);
    }

    println!("{} ({})", weather.condition, weather.description);
    println!(
        "  Temperature:   {:.1} °C (feels like {:.1} °C)",
        weather.temperature_c, weather.feels_like_c
    );
    println!("  Humidity:      {}%", weather.humidity_pct);
    println!("  Pressure:      {:.0} hPa", weather.pressure_hpa);
    println!("  Wind:          {:.1} m/s from {:.0}°", weather.wind_speed_mps, weather.wind_dir_deg);
    println!("  Cloudiness:    {}%", weather.cloudiness_pct);
    println!("  Precipitation: {:.1} mm", weather.precipitation_mm);
    println!("  Visibility:    {} m", weather.visibility_m);
    println!("  Observed:      {}", weather.observed_at.format("%Y-%m-%d %H:%M UTC"));
    println!("  Source:        {}", source(&weather.provider_tag, weather.is_simulated));
    Ok(())
}

pub fn print_forecast(entries: &[ForecastEntry], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(entries);
    }

    for e in entries {
        println!(
            "{}  {:>5.1} °C  {:>3}%  {:>5.1} m/s  {:>4.1} mm  {}",
            e.at.format("%a %d %H:%M"),
            e.temperature_c,
            e.humidity_pct,
            e.wind_speed_mps,
            e.precipitation_mm,
            e.condition,
        );
    }
    if entries.first().is_some_and(|e| e.is_simulated) {
        println!("Source: simulated (no provider available)");
    }
    Ok(())
}

pub fn print_air_quality(air: &AirQuality, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(air);
    }

    let label = match air.aqi {
        1 => "good",
        2 => "fair",
        3 => "moderate",
        4 => "poor",
        _ => "very poor",
    };

    println!("AQI {} ({label})", air.aqi);
    println!("  CO:    {:.2} µg/m³", air.co);
    println!("  NO2:   {:.2} µg/m³", air.no2);
    println!("  O3:    {:.2} µg/m³", air.o3);
    println!("  PM2.5: {:.2} µg/m³", air.pm2_5);
    println!("  PM10:  {:.2} µg/m³", air.pm10);
    println!("  Source: {}", source(&air.provider_tag, air.is_simulated));
    Ok(())
}
