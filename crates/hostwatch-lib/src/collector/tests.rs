//! Tests for the Linux metric source
//!
//! These tests use a mock procfs/sysfs tree to exercise parsing and counter
//! handling without depending on the host they run on.

#[cfg(test)]
mod mock_proc_tests {
    use crate::collector::{
        discover_default_interface, parse_df_output, parse_meminfo, parse_ps_output, CpuTimes,
        MetricSource, ProcMetricSource,
    };
    use crate::error::SourceError;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio::fs;

    /// Helper to create a mock /proc and /sys tree
    async fn create_mock_host(temp_dir: &TempDir) -> (PathBuf, PathBuf) {
        let proc_path = temp_dir.path().join("proc");
        let sys_path = temp_dir.path().join("sys");

        fs::create_dir_all(proc_path.join("net")).await.unwrap();
        let stats = sys_path.join("class/net/eth0/statistics");
        fs::create_dir_all(&stats).await.unwrap();

        fs::write(
            proc_path.join("stat"),
            "cpu  100 0 100 700 100 0 0 0 0 0\ncpu0 100 0 100 700 100 0 0 0 0 0\n",
        )
        .await
        .unwrap();

        let meminfo = r#"MemTotal:        8000000 kB
MemFree:          500000 kB
MemAvailable:    2000000 kB
Buffers:          100000 kB
Cached:          1000000 kB
"#;
        fs::write(proc_path.join("meminfo"), meminfo).await.unwrap();

        fs::write(
            proc_path.join("net/route"),
            "Iface\tDestination\tGateway \tFlags\nens3\t00000000\t0101A8C0\t0003\n",
        )
        .await
        .unwrap();

        fs::write(stats.join("rx_bytes"), "123456\n").await.unwrap();
        fs::write(stats.join("tx_bytes"), "654321\n").await.unwrap();

        (proc_path, sys_path)
    }

    #[tokio::test]
    async fn test_cpu_percent_uses_delta_between_reads() {
        let temp_dir = TempDir::new().unwrap();
        let (proc_path, sys_path) = create_mock_host(&temp_dir).await;
        let source = ProcMetricSource::with_paths(&proc_path, &sys_path, "/");

        // Since boot: total 1000, idle 800 -> 20% busy
        assert_eq!(source.cpu_percent().await.unwrap(), 20);

        // +100 total, +10 idle -> 90% busy
        fs::write(proc_path.join("stat"), "cpu  180 0 110 710 100 0 0 0 0 0\n")
            .await
            .unwrap();
        assert_eq!(source.cpu_percent().await.unwrap(), 90);
    }

    #[tokio::test]
    async fn test_ram_percent_from_meminfo() {
        let temp_dir = TempDir::new().unwrap();
        let (proc_path, sys_path) = create_mock_host(&temp_dir).await;
        let source = ProcMetricSource::with_paths(&proc_path, &sys_path, "/");

        // (8000000 - 2000000) / 8000000 = 75%
        assert_eq!(source.ram_percent().await.unwrap(), 75);
    }

    #[tokio::test]
    async fn test_byte_counters() {
        let temp_dir = TempDir::new().unwrap();
        let (proc_path, sys_path) = create_mock_host(&temp_dir).await;
        let source = ProcMetricSource::with_paths(&proc_path, &sys_path, "/");

        let counters = source.byte_counters("eth0").await.unwrap();
        assert_eq!(counters.received, 123456);
        assert_eq!(counters.transmitted, 654321);
    }

    #[tokio::test]
    async fn test_byte_counters_missing_interface() {
        let temp_dir = TempDir::new().unwrap();
        let (proc_path, sys_path) = create_mock_host(&temp_dir).await;
        let source = ProcMetricSource::with_paths(&proc_path, &sys_path, "/");

        let err = source.byte_counters("wlan9").await.unwrap_err();
        assert!(matches!(err, SourceError::MissingInterface(ref name) if name == "wlan9"));
    }

    #[tokio::test]
    async fn test_garbled_counter_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let (proc_path, sys_path) = create_mock_host(&temp_dir).await;
        fs::write(sys_path.join("class/net/eth0/statistics/rx_bytes"), "n/a\n")
            .await
            .unwrap();
        let source = ProcMetricSource::with_paths(&proc_path, &sys_path, "/");

        let err = source.byte_counters("eth0").await.unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_discover_default_interface_from_mock_proc() {
        let temp_dir = TempDir::new().unwrap();
        let (proc_path, _) = create_mock_host(&temp_dir).await;

        let interface = discover_default_interface(&proc_path).await.unwrap();
        assert_eq!(interface, "ens3");
    }

    #[tokio::test]
    async fn test_discover_without_route_table_fails() {
        let temp_dir = TempDir::new().unwrap();

        let result = discover_default_interface(temp_dir.path()).await;
        assert!(matches!(result, Err(SourceError::Io { .. })));
    }

    #[test]
    fn test_cpu_times_rejects_garbage() {
        assert!(CpuTimes::parse("intr 12345\n").is_err());
        assert!(CpuTimes::parse("cpu  a b c d\n").is_err());
    }

    #[test]
    fn test_cpu_times_no_elapsed_time_is_zero() {
        let times = CpuTimes { idle: 10, total: 100 };
        assert_eq!(times.busy_percent_since(&times), 0);
    }

    #[test]
    fn test_meminfo_without_mem_available() {
        let meminfo = "MemTotal: 1000 kB\nMemFree: 200 kB\nBuffers: 100 kB\nCached: 200 kB\n";
        // available estimate = 500 -> 50% used
        assert_eq!(parse_meminfo(meminfo).unwrap(), 50);
    }

    #[test]
    fn test_meminfo_missing_total() {
        assert!(parse_meminfo("MemFree: 200 kB\n").is_err());
    }

    #[test]
    fn test_parse_df_output() {
        let output = "Filesystem     1024-blocks      Used Available Capacity Mounted on\n\
                      /dev/sda1         41152736  17262132  21777120      45% /\n";
        assert_eq!(parse_df_output(output).unwrap(), 45);
    }

    #[test]
    fn test_parse_df_output_unparsable() {
        assert!(parse_df_output("df: /nope: No such file or directory\n").is_err());
        assert!(parse_df_output("Filesystem Size Used Avail Use% Mounted\nx y z w - /\n").is_err());
    }

    #[test]
    fn test_parse_ps_output_skips_header_and_limits() {
        let output = "    PID COMMAND         %CPU\n\
                      1234 java            97.3\n\
                      5678 Web Content     12.5\n\
                      42 nginx            3.0\n\
                      7 kworker/0:1      0.1\n";

        let rows = parse_ps_output(output, 3);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].pid, 1234);
        assert_eq!(rows[0].name, "java");
        assert!((rows[0].cpu_percent - 97.3).abs() < 1e-9);
        assert_eq!(rows[1].name, "Web Content");
        assert_eq!(rows[2].name, "nginx");
    }

    #[test]
    fn test_parse_ps_output_drops_malformed_rows() {
        let output = "PID COMMAND %CPU\nabc java 1.0\n12 sshd x\n13 bash 0.5\n";

        let rows = parse_ps_output(output, 3);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "bash");
    }
}
