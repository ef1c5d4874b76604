//! Image output for the topology statistics. Everything goes through
//! `plotters` bitmap backends; callers pick the file names.

use std::{collections::BTreeMap, net::IpAddr, path::Path};

use plotters::prelude::*;

use crate::topology::TopologyGraph;

pub type PlotResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const TCP_COLOR: RGBColor = BLUE;
const UDP_COLOR: RGBColor = RED;

/// Degree distributions of both protocol graphs on log-log axes, one
/// point per (degree, host count). Empty distributions simply plot no
/// points.
pub fn degree_distribution_plot(
    tcp: &BTreeMap<usize, usize>,
    udp: &BTreeMap<usize, usize>,
    out: &Path,
) -> PlotResult {
    scatter_log_log(
        tcp,
        udp,
        out,
        "Degree distribution, TCP and UDP",
        "Degree",
        "Frequency",
    )
}

/// Component-size distributions on log-log axes, one point per
/// (component size, number of components of that size).
pub fn component_size_plot(tcp_sizes: &[usize], udp_sizes: &[usize], out: &Path) -> PlotResult {
    let count_by_size = |sizes: &[usize]| -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for size in sizes {
            *counts.entry(*size).or_insert(0) += 1;
        }
        counts
    };
    scatter_log_log(
        &count_by_size(tcp_sizes),
        &count_by_size(udp_sizes),
        out,
        "Hosts per component, TCP and UDP",
        "Hosts in component",
        "Number of components",
    )
}

fn scatter_log_log(
    tcp: &BTreeMap<usize, usize>,
    udp: &BTreeMap<usize, usize>,
    out: &Path,
    caption: &str,
    x_desc: &str,
    y_desc: &str,
) -> PlotResult {
    let max_x = tcp.keys().chain(udp.keys()).copied().max().unwrap_or(1).max(1) as f64;
    let max_y = tcp
        .values()
        .chain(udp.values())
        .copied()
        .max()
        .unwrap_or(1)
        .max(1) as f64;

    let root = BitMapBackend::new(out, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(caption, ("sans-serif", 24))
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(
            (1f64..max_x * 1.5).log_scale(),
            (1f64..max_y * 1.5).log_scale(),
        )?;
    chart.configure_mesh().x_desc(x_desc).y_desc(y_desc).draw()?;

    chart
        .draw_series(
            tcp.iter()
                .map(|(x, y)| Circle::new((*x as f64, *y as f64), 4, TCP_COLOR.filled())),
        )?
        .label("TCP")
        .legend(|(x, y)| Circle::new((x + 10, y), 4, TCP_COLOR.filled()));
    chart
        .draw_series(
            udp.iter()
                .map(|(x, y)| TriangleMarker::new((*x as f64, *y as f64), 5, UDP_COLOR.filled())),
        )?
        .label("UDP")
        .legend(|(x, y)| TriangleMarker::new((x + 10, y), 5, UDP_COLOR.filled()));

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()?;
    root.present()?;
    Ok(())
}

/// Draw the subgraph induced by `hosts` (typically the largest
/// component) with the hosts on a circle and one line per session.
/// Labels are drawn only when the component is small enough to read.
pub fn component_plot(
    graph: &TopologyGraph,
    hosts: &[IpAddr],
    caption: &str,
    out: &Path,
) -> PlotResult {
    let positions: BTreeMap<IpAddr, (f64, f64)> = hosts
        .iter()
        .enumerate()
        .map(|(i, host)| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / hosts.len().max(1) as f64;
            (*host, (angle.cos(), angle.sin()))
        })
        .collect();

    let root = BitMapBackend::new(out, (900, 900)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(caption, ("sans-serif", 24))
        .build_cartesian_2d(-1.3f64..1.3, -1.3f64..1.3)?;

    let max_weight = graph
        .edges_among(hosts)
        .map(|(_, _, w)| w)
        .max()
        .unwrap_or(1)
        .max(1) as f64;

    chart.draw_series(graph.edges_among(hosts).map(|(a, b, weight)| {
        // heavier sessions draw darker
        let shade = 0.2 + 0.8 * weight as f64 / max_weight;
        PathElement::new(vec![positions[&a], positions[&b]], &BLACK.mix(shade))
    }))?;
    chart.draw_series(
        positions
            .values()
            .map(|position| Circle::new(*position, 5, TCP_COLOR.filled())),
    )?;
    if hosts.len() <= 24 {
        chart.draw_series(positions.iter().map(|(host, (x, y))| {
            Text::new(
                host.to_string(),
                (*x + 0.03, *y + 0.03),
                ("sans-serif", 14).into_font(),
            )
        }))?;
    }

    root.present()?;
    Ok(())
}

