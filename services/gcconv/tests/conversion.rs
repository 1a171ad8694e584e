//! End-to-end conversion and macro generation

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::fs;

use bridge_config::{AxisSettings, AxisTable, BridgeSettings};
use gcconv::{convert_file, convert_str, write_macros, MacroTemplates, StreamConverter};

const PROGRAM: &str = "%\r\n\
(milling pass)\r\n\
G0 X0 Y0 F1200\r\n\
M3 S12000\r\n\
G1 X10.5 Y-3.25 F450\r\n\
G1 A90 F200\r\n\
M98 P100 X1\r\n\
G01 Z-1\r\n\
M5\r\n\
M30";

fn settings() -> BridgeSettings {
    let mut x = AxisSettings::new('X', 400);
    x.speed = 300;
    x.rapid_speed = 900;
    x.max_speed = 1000;
    x.replace_in_source = true;

    let mut a = AxisSettings::new('A', 80);
    a.speed = 150;
    a.start_pos = 5;

    BridgeSettings {
        disable_macros: vec!["M98".to_string()],
        axes: AxisTable::from_axes(vec![x, a]).unwrap(),
        ..Default::default()
    }
}

fn convert_in_chunks(settings: &BridgeSettings, chunks: &[&[u8]]) -> String {
    let mut converter = StreamConverter::new(settings).unwrap();
    let mut output = Vec::new();
    for chunk in chunks {
        converter.feed(chunk, &mut output).unwrap();
    }
    converter.finish(&mut output).unwrap();
    String::from_utf8(output).unwrap()
}

#[test]
fn test_full_program() {
    let output = convert_str(&settings(), PROGRAM).unwrap();
    let lines: Vec<&str> = output.split("\r\n").collect();

    assert_eq!(
        lines,
        vec![
            "#22=1",
            "#1=5.000",
            "#2=0.000",
            "M5",
            "M4",
            "(milling pass)",
            "G0 Y0 F1200",
            "#15=1",
            "#16=0.000",
            "#17=900",
            "M3",
            "#21=1",
            "S12000",
            "M3",
            "G1 Y-3.25 F450",
            "#16=10.500",
            "#17=450",
            "M3",
            "G1 A90 F200",
            "#15=0",
            "#16=90.000",
            "#17=200",
            "M3",
            "#22=0",
            "M98 P100 X1",
            "#22=1",
            "G01 Z-1",
            "#21=1",
            "M5",
            "M30",
            "M5",
            "",
        ]
    );
}

#[test]
fn test_output_independent_of_chunk_boundaries() {
    let settings = settings();
    let expected = convert_str(&settings, PROGRAM).unwrap();
    let bytes = PROGRAM.as_bytes();

    for split in 0..=bytes.len() {
        let (head, tail) = bytes.split_at(split);
        assert_eq!(
            convert_in_chunks(&settings, &[head, tail]),
            expected,
            "split at {}",
            split
        );
    }

    for size in 1..8 {
        let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
        assert_eq!(convert_in_chunks(&settings, &chunks), expected, "chunk size {}", size);
    }
}

#[test]
fn test_convert_file_replaces_destination() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("part.nc");
    let destination = dir.path().join("part.tap");
    fs::write(&source, PROGRAM).unwrap();
    fs::write(&destination, "stale content that is longer than nothing").unwrap();

    let stats = convert_file(&settings(), &source, &destination).unwrap();

    let written = fs::read_to_string(&destination).unwrap();
    assert_eq!(written, convert_str(&settings(), PROGRAM).unwrap());
    assert_eq!(stats.source_lines, 10);
    assert_eq!(stats.output_lines, 31);
    assert_eq!(stats.bytes_read, PROGRAM.len());
    assert_eq!(stats.bytes_written, written.len());
}

#[test]
fn test_large_program_streams_in_chunks() {
    let settings = settings();
    let mut program = String::from("%\n");
    for i in 0..20_000 {
        program.push_str(&format!("G1 X{}.5 F400\n", i % 40));
    }

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("big.nc");
    let destination = dir.path().join("big.tap");
    fs::write(&source, &program).unwrap();

    let stats = convert_file(&settings, &source, &destination).unwrap();
    assert_eq!(stats.source_lines, 20_001);

    let written = fs::read_to_string(&destination).unwrap();
    assert_eq!(written, convert_str(&settings, &program).unwrap());
    assert!(written.ends_with("M3\r\nM5\r\n"));
}

#[test]
fn test_write_macros() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings();

    let export = write_macros(&settings, &MacroTemplates::builtin(), dir.path()).unwrap();

    let names: Vec<String> = export
        .files
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["M4.m1s", "M3.m1s", "M5.m1s"]);

    let init = fs::read_to_string(dir.path().join("M4.m1s")).unwrap();
    assert!(init.contains("axisSet = Array(0,"));
    assert!(init.contains("axisCount = 2"));
    assert!(init.contains("CreateSerialPort2(\"COM3\""));
    assert!(!init.contains('{'));

    let move_macro = fs::read_to_string(dir.path().join("M3.m1s")).unwrap();
    assert!(move_macro.contains("commonBase = 15"));
    assert!(move_macro.contains("axisVarsBase = 23"));

    let close = fs::read_to_string(dir.path().join("M5.m1s")).unwrap();
    assert!(close.contains("CloseSerialPort"));
}

#[test]
fn test_custom_templates() {
    let templates_dir = tempfile::tempdir().unwrap();
    fs::write(
        templates_dir.path().join("MacrosInitTemplate.txt"),
        "open {4} at {5} for {1} axes",
    )
    .unwrap();
    fs::write(templates_dir.path().join("MacrosMoveTemplate.txt"), "move #{3}").unwrap();
    fs::write(
        templates_dir.path().join("MacrosCloseSerialPortTemplate.txt"),
        "close {{{0}}}",
    )
    .unwrap();

    let mut settings = settings();
    settings.port_name = "/dev/ttyUSB0".to_string();
    settings.baud_rate = 115_200;

    let templates = MacroTemplates::load(templates_dir.path()).unwrap();
    let out = tempfile::tempdir().unwrap();
    write_macros(&settings, &templates, out.path()).unwrap();

    assert_eq!(
        fs::read_to_string(out.path().join("M4.m1s")).unwrap(),
        "open /dev/ttyUSB0 at 115200 for 2 axes"
    );
    assert_eq!(fs::read_to_string(out.path().join("M3.m1s")).unwrap(), "move #15");
    assert_eq!(fs::read_to_string(out.path().join("M5.m1s")).unwrap(), "close {15}");
}

#[test]
fn test_missing_template_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(MacroTemplates::load(&dir.path().join("missing")).is_err());
}
