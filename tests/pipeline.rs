mod integration {
    mod pipeline {
        use siphon::metric::Metric;
        use siphon::mpsc;
        use siphon::protocols::wire;
        use siphon::scheduler::Overlap;
        use siphon::shutdown::Shutdown;
        use siphon::sink::{ClickHouse, ClickHouseConfig, Exit, FailurePolicy, Sink,
                                 SubmissionError};
        use siphon::source::{Fpm, FpmConfig, Listener, ListenerConfig, Source};
        use std::io::Read;
        use std::net::UdpSocket;
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::{Arc, Mutex};
        use std::thread;
        use std::time::{Duration, Instant};

        /// A sink that keeps everything it is handed.
        struct Collect(Arc<Mutex<Vec<Metric>>>);

        impl Sink for Collect {
            fn write(&mut self, metric: &Metric) -> Result<(), SubmissionError> {
                self.0.lock().unwrap().push(metric.clone());
                Ok(())
            }

            fn reconnect(&mut self) -> Result<(), SubmissionError> {
                Ok(())
            }

            fn close(&mut self) {}
        }

        fn wait_for<F>(what: &str, mut done: F)
        where
            F: FnMut() -> bool,
        {
            let deadline = Instant::now() + Duration::from_secs(10);
            while !done() {
                assert!(Instant::now() < deadline, "timed out waiting for {}", what);
                thread::sleep(Duration::from_millis(10));
            }
        }

        #[test]
        fn udp_frames_reach_the_sink_in_order() {
            let shutdown = Shutdown::new();
            let (snd, recv) = mpsc::channel(16);

            let mut listener = Listener::bind(&ListenerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            }).unwrap();
            let addr = listener.local_addrs()[0];
            let thr_shutdown = shutdown.clone();
            let source = thread::spawn(move || listener.run(snd, thr_shutdown));

            let seen = Arc::new(Mutex::new(Vec::new()));
            let mut collect = Collect(Arc::clone(&seen));
            let thr_shutdown = shutdown.clone();
            let sink = thread::spawn(move || {
                collect.run(recv, FailurePolicy::Stop, 1, &thr_shutdown)
            });

            let client = UdpSocket::bind("127.0.0.1:0").unwrap();
            for i in 0..5 {
                let m = Metric::new("requests", i)
                    .timestamp_secs(1_700_000_000)
                    .tags(vec!["web", "eu"]);
                let mut frame = Vec::new();
                wire::encode(&m, &mut frame).unwrap();
                client.send_to(&frame, addr).unwrap();
                // garbage between good frames is skipped
                client.send_to(b"short", addr).unwrap();
            }

            wait_for("five metrics", || seen.lock().unwrap().len() == 5);
            shutdown.cancel();

            assert_eq!(Exit::Cancelled, sink.join().unwrap());
            assert!(source.join().unwrap().is_ok());

            let seen = seen.lock().unwrap();
            let values: Vec<i64> = seen.iter().map(|m| m.value).collect();
            assert_eq!(vec![0, 1, 2, 3, 4], values);
            for m in seen.iter() {
                assert_eq!("requests", m.name);
                assert_eq!(("web", "eu", ""), (m.tag1.as_str(), m.tag2.as_str(), m.tag3.as_str()));
                assert_eq!(1_700_000_000, m.timestamp.timestamp());
            }
        }

        const FPM_STATUS: &str = r#"{"pool":"www","accepted conn":12,"listen queue":0,
            "max listen queue":1,"idle processes":2,"active processes":1,
            "max active processes":3,"slow requests":0}"#;

        /// One HTTP server playing both the FPM status page and ClickHouse.
        /// Returns its port, the insert bodies it has received and a stop
        /// flag.
        fn fake_backends() -> (u16, Arc<Mutex<Vec<String>>>, Arc<AtomicBool>) {
            let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
            let port = server.server_addr().to_ip().unwrap().port();
            let inserts = Arc::new(Mutex::new(Vec::new()));
            let stop = Arc::new(AtomicBool::new(false));

            let (thr_inserts, thr_stop) = (Arc::clone(&inserts), Arc::clone(&stop));
            thread::spawn(move || {
                while !thr_stop.load(Ordering::SeqCst) {
                    let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                        Ok(Some(request)) => request,
                        Ok(None) => continue,
                        Err(_) => return,
                    };
                    let reply = if request.url().starts_with("/status") {
                        FPM_STATUS.to_string()
                    } else if *request.method() == tiny_http::Method::Post {
                        let mut body = String::new();
                        request.as_reader().read_to_string(&mut body).unwrap();
                        thr_inserts.lock().unwrap().push(body);
                        String::new()
                    } else {
                        "Ok.\n".to_string()
                    };
                    let _ = request.respond(tiny_http::Response::from_string(reply));
                }
            });
            (port, inserts, stop)
        }

        #[test]
        fn fpm_poll_lands_in_clickhouse() {
            let (port, inserts, stop) = fake_backends();
            let shutdown = Shutdown::new();
            let (snd, recv) = mpsc::channel(16);

            let mut ch = ClickHouse::connect(ClickHouseConfig {
                host: "127.0.0.1".to_string(),
                port,
                ..Default::default()
            }).unwrap();
            ch.migrate().unwrap();
            let thr_shutdown = shutdown.clone();
            let sink = thread::spawn(move || ch.run(recv, FailurePolicy::Stop, 1, &thr_shutdown));

            let mut fpm = Fpm::new(FpmConfig {
                name: "www".to_string(),
                url: format!("http://127.0.0.1:{}/status", port).parse().unwrap(),
                interval: Duration::from_millis(200),
                overlap: Overlap::Skip,
            });
            let thr_shutdown = shutdown.clone();
            let source = thread::spawn(move || fpm.run(snd, thr_shutdown));

            // the DDL plus one tick's worth of rows
            wait_for("seven inserts", || inserts.lock().unwrap().len() >= 8);
            shutdown.cancel();
            assert_eq!(Exit::Cancelled, sink.join().unwrap());
            assert!(source.join().unwrap().is_ok());
            stop.store(true, Ordering::SeqCst);

            let inserts = inserts.lock().unwrap();
            assert!(inserts[0].starts_with("CREATE TABLE IF NOT EXISTS metrics"));
            assert!(inserts[1].starts_with("INSERT INTO metrics VALUES("));
            assert!(inserts[1].ends_with(",'fpm_accepted_total',12,'www','','')"));
            assert!(inserts[7].ends_with(",'fpm_queue_max',1,'www','','')"));
        }
    }
}
