//! Integration tests for the page-stat dataset
//!
//! perf-script text in, zero-filled page table with promotion labels out.

use faultcast::config::{DatasetConfig, MappingConfig, PromotionThresholds};
use faultcast::mapper::{MapError, PageMapper};
use faultcast::output::PageStatCsv;
use faultcast::page_stats::PageStatParser;
use faultcast::pipeline::page_stats_from_files;

fn parser(base: u64, page_size: u64, num_pages: u64) -> PageStatParser {
    PageStatParser::new(PageMapper::new(&MappingConfig::new(base, page_size, num_pages)).unwrap())
}

fn line(count: u64, event: &str, address: u64) -> String {
    format!("workload  812 2201.000017:   {:>8} {}:u:   {:x}", count, event, address)
}

#[test]
fn test_small_region_scenario() {
    let mut p = parser(0x1000, 4096, 4);
    p.ingest_line(&line(1, "page-faults", 0x1fff));
    p.ingest_line(&line(7, "mem-loads", 0x3000));

    let records = p.finish(&PromotionThresholds::default());
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].page_faults, 1);

    // the unknown event touched no field of page 2
    let page2 = &records[2];
    assert_eq!(page2.page_faults, 0);
    assert_eq!(page2.cache_misses + page2.cache_references, 0);
    assert_eq!(page2.tlb_load_misses + page2.tlb_store_misses, 0);
    assert_eq!(page2.access_frequency, 0);
    assert_eq!(p.diagnostics().unknown_events, 1);
}

#[test]
fn test_region_edges() {
    let mapper = PageMapper::new(&MappingConfig::new(0x1000, 4096, 4)).unwrap();
    assert_eq!(mapper.map(0x1000), Ok(0));
    assert_eq!(mapper.map(0x4fff), Ok(3));
    assert_eq!(mapper.map(0x5000), Err(MapError::BeyondRegion(0x5000)));
    assert_eq!(mapper.map(0x0fff), Err(MapError::BelowBase(0x0fff)));
}

#[test]
fn test_promotion_label() {
    let mut p = parser(0x10_0000, 4096, 8);
    // page 1: 1300 accesses, 7.7% TLB misses
    p.ingest_line(&line(1200, "cache-references", 0x10_1010));
    p.ingest_line(&line(100, "dTLB-load-misses", 0x10_1020));
    // page 2: 2050 accesses, 2.4% TLB misses
    p.ingest_line(&line(2000, "cache-references", 0x10_2000));
    p.ingest_line(&line(50, "dTLB-store-misses", 0x10_2008));
    // page 3: high TLB rate but too few accesses
    p.ingest_line(&line(10, "page-faults", 0x10_3000));
    p.ingest_line(&line(10, "dTLB-load-misses", 0x10_3000));

    let records = p.finish(&PromotionThresholds::default());
    assert_eq!(records[1].access_frequency, 1300);
    assert!(records[1].tlb_miss_rate > 5.0);
    assert_eq!(records[1].label, 1);
    assert_eq!(records[2].label, 0);
    assert_eq!(records[3].label, 0);
    assert_eq!(records.iter().filter(|r| r.label == 1).count(), 1);
}

#[test]
fn test_kernel_and_out_of_range_are_discounted() {
    let mut p = parser(0x7fda_3ea4_8000, 4096, 16);
    p.ingest_lines([
        line(1, "page-faults", 0xffff_ffff_a100_0000),
        line(1, "page-faults", 0x7fda_3ea4_7fff),
        line(1, "page-faults", 0x7fda_3ea5_8000),
        "not a sample".to_string(),
        line(5, "cache-misses", 0x7fda_3ea4_8100),
    ]);

    let d = p.diagnostics();
    assert_eq!(d.lines, 5);
    assert_eq!(d.malformed, 1);
    assert_eq!(d.kernel_addresses, 1);
    assert_eq!(d.out_of_range, 2);
    assert_eq!(d.counted, 1);

    let records = p.finish(&PromotionThresholds::default());
    let total_faults: u64 = records.iter().map(|r| r.page_faults).sum();
    assert_eq!(total_faults, 0);
    assert_eq!(records[0].cache_misses, 5);
}

#[test]
fn test_files_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let perf = dir.path().join("perf_output.txt");
    let info = dir.path().join("mmap_info.txt");
    std::fs::write(
        &perf,
        [
            line(1, "page-faults", 0x5555_0000_0010),
            line(4, "cache-references", 0x5555_0000_1010),
            line(1, "cache-misses", 0x5555_0000_1010),
        ]
        .join("\n"),
    )
    .unwrap();
    std::fs::write(&info, "PID: 812\nBase Address: 0x555500000000\nSize: 4096000\n").unwrap();

    let config = DatasetConfig {
        mapping: MappingConfig {
            num_pages: 4,
            ..MappingConfig::default()
        },
        ..DatasetConfig::default()
    };
    let run = page_stats_from_files(&perf, Some(&info), &config).unwrap();
    let csv = PageStatCsv::to_csv(&run.records);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[1], "0,1,0,0,0,0,0,1,0,0");
    assert_eq!(lines[2], "1,0,0,0,1,4,0.25,4,0,0");
}
