mod play_counts;
